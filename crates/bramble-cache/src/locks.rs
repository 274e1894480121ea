//! Per-key async locks
//!
//! Serializes loaders and writers touching the same key while leaving
//! operations on different keys fully independent. A single global lock here
//! would reintroduce the stampedes this exists to prevent.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of one async lock per key
pub struct KeyLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> KeyLocks<K>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty lock table
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for a key, creating it on first use.
    ///
    /// The table mutex is only held while cloning the per-key handle, never
    /// across the actual wait.
    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of keys that currently have a lock allocated
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Whether any key has a lock allocated
    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}

impl<K> Default for KeyLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
