//! Read-through cache keyed by the backing source's key type

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::locks::KeyLocks;
use crate::source::CacheSource;

/// In-memory snapshot cache in front of a [`CacheSource`].
///
/// Every mutating path and every loader runs under that key's lock, so a
/// burst of first reads for one key produces exactly one source round-trip
/// while reads for other keys proceed untouched. Entries live until an
/// explicit `invalidate`/`refresh`; there is no TTL.
pub struct KeyedCache<S: CacheSource> {
    source: S,
    entries: RwLock<HashMap<S::Key, S::Value>>,
    locks: KeyLocks<S::Key>,
}

impl<S: CacheSource> KeyedCache<S> {
    /// Create an empty cache over a backing source
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
            locks: KeyLocks::new(),
        }
    }

    /// Get the value for a key, loading it from the source on a miss or when
    /// `no_cache` forces a bypass. The loaded snapshot is stored either way.
    pub async fn get(&self, key: &S::Key, no_cache: bool) -> Result<S::Value, S::Error> {
        let _guard = self.locks.acquire(key).await;

        if !no_cache {
            if let Some(value) = self.entries.read().await.get(key) {
                return Ok(value.clone());
            }
        }

        debug!(key = %key, no_cache, "cache miss, loading from source");
        let value = self.source.load(key).await.map_err(CacheError::Source)?;
        self.entries
            .write()
            .await
            .insert(key.clone(), value.clone());
        Ok(value)
    }

    /// Current cached snapshot without touching the source
    pub async fn peek(&self, key: &S::Key) -> Option<S::Value> {
        self.entries.read().await.get(key).cloned()
    }

    /// Replace the cached snapshot for a key (write-through after a store
    /// update)
    pub async fn insert(&self, key: S::Key, value: S::Value) {
        let _guard = self.locks.acquire(&key).await;
        self.entries.write().await.insert(key, value);
    }

    /// Drop one entry; a no-op when the key is not cached
    pub async fn invalidate(&self, key: &S::Key) {
        let _guard = self.locks.acquire(key).await;
        self.entries.write().await.remove(key);
    }

    /// Drop every entry
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    /// Force a reload from the source, bypassing and then repopulating the
    /// cache. Unlike `get` this never creates a record: an absent backing
    /// record is an error.
    pub async fn refresh(&self, key: &S::Key) -> Result<S::Value, S::Error> {
        let _guard = self.locks.acquire(key).await;

        self.entries.write().await.remove(key);
        match self.source.reload(key).await.map_err(CacheError::Source)? {
            Some(value) => {
                self.entries
                    .write()
                    .await
                    .insert(key.clone(), value.clone());
                Ok(value)
            }
            None => Err(CacheError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Number of cached entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("backing store failed: {0}")]
    struct MockError(String);

    /// Source over a mutable map, counting loads and optionally stalling
    struct MockSource {
        data: Mutex<HashMap<String, String>>,
        loads: AtomicUsize,
        load_delay: Option<Duration>,
        fail: bool,
    }

    impl MockSource {
        fn with_data(pairs: &[(&str, &str)]) -> Self {
            let data = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Self {
                data: Mutex::new(data),
                loads: AtomicUsize::new(0),
                load_delay: None,
                fail: false,
            }
        }

        fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CacheSource for MockSource {
        type Key = String;
        type Value = String;
        type Error = MockError;

        async fn load(&self, key: &String) -> std::result::Result<String, MockError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MockError("unavailable".to_string()));
            }
            if let Some(delay) = self.load_delay {
                tokio::time::sleep(delay).await;
            }
            // Get-or-create: absent keys come back as empty records.
            let mut data = self.data.lock().await;
            Ok(data.entry(key.clone()).or_default().clone())
        }

        async fn reload(&self, key: &String) -> std::result::Result<Option<String>, MockError> {
            if self.fail {
                return Err(MockError("unavailable".to_string()));
            }
            Ok(self.data.lock().await.get(key).cloned())
        }
    }

    #[tokio::test]
    async fn test_read_through_populates_cache() {
        let cache = KeyedCache::new(MockSource::with_data(&[("k", "v")]));

        assert_eq!(cache.get(&"k".to_string(), false).await.unwrap(), "v");
        assert_eq!(cache.get(&"k".to_string(), false).await.unwrap(), "v");
        assert_eq!(cache.source.load_count(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_no_cache_bypasses_but_repopulates() {
        let cache = KeyedCache::new(MockSource::with_data(&[("k", "v")]));

        cache.get(&"k".to_string(), false).await.unwrap();
        cache
            .source
            .data
            .lock()
            .await
            .insert("k".to_string(), "v2".to_string());

        // Cached read still sees the snapshot; a forced read sees the store
        // and replaces the snapshot.
        assert_eq!(cache.get(&"k".to_string(), false).await.unwrap(), "v");
        assert_eq!(cache.get(&"k".to_string(), true).await.unwrap(), "v2");
        assert_eq!(cache.peek(&"k".to_string()).await.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_concurrent_first_access_loads_once() {
        let source = MockSource {
            load_delay: Some(Duration::from_millis(10)),
            ..MockSource::with_data(&[("k", "v")])
        };
        let cache = Arc::new(KeyedCache::new(source));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(
                async move { cache.get(&"k".to_string(), false).await },
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "v");
        }

        assert_eq!(cache.source.load_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_key_does_not_block_other_keys() {
        let source = MockSource {
            load_delay: Some(Duration::from_millis(100)),
            ..MockSource::with_data(&[("slow", "s"), ("fast", "f")])
        };
        let cache = Arc::new(KeyedCache::new(source));

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&"slow".to_string(), false).await })
        };
        tokio::task::yield_now().await;

        // Cached entry for a different key must be reachable while the slow
        // load is in flight.
        cache.insert("fast".to_string(), "f".to_string()).await;
        let fast = tokio::time::timeout(
            Duration::from_millis(50),
            cache.get(&"fast".to_string(), false),
        )
        .await;
        assert_eq!(fast.unwrap().unwrap(), "f");

        assert_eq!(slow.await.unwrap().unwrap(), "s");
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let cache = KeyedCache::new(MockSource::with_data(&[("k", "v")]));

        cache.get(&"k".to_string(), false).await.unwrap();
        cache.invalidate(&"k".to_string()).await;
        cache.invalidate(&"k".to_string()).await;
        assert!(cache.is_empty().await);

        // Next read goes back to the source.
        cache.get(&"k".to_string(), false).await.unwrap();
        assert_eq!(cache.source.load_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_all_clears() {
        let cache = KeyedCache::new(MockSource::with_data(&[("a", "1"), ("b", "2")]));
        cache.get(&"a".to_string(), false).await.unwrap();
        cache.get(&"b".to_string(), false).await.unwrap();

        cache.invalidate_all().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_refresh_reloads_and_repopulates() {
        let cache = KeyedCache::new(MockSource::with_data(&[("k", "v")]));
        cache.get(&"k".to_string(), false).await.unwrap();

        cache
            .source
            .data
            .lock()
            .await
            .insert("k".to_string(), "v2".to_string());
        assert_eq!(cache.refresh(&"k".to_string()).await.unwrap(), "v2");
        assert_eq!(cache.peek(&"k".to_string()).await.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_refresh_missing_record_errors() {
        let cache = KeyedCache::new(MockSource::with_data(&[]));

        let err = cache.refresh(&"ghost".to_string()).await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound { ref key } if key == "ghost"));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let source = MockSource {
            fail: true,
            ..MockSource::with_data(&[])
        };
        let cache = KeyedCache::new(source);

        let err = cache.get(&"k".to_string(), false).await.unwrap_err();
        assert!(matches!(err, CacheError::Source(_)));
        assert!(cache.is_empty().await);
    }
}
