//! Backing-source seam for keyed caches

use std::fmt::Display;
use std::hash::Hash;

use async_trait::async_trait;

/// A backing store a [`crate::KeyedCache`] reads through to.
///
/// `load` carries the store's own absence semantics (for permission records
/// that is get-or-create), while `reload` reports absence as `None` so the
/// cache can refuse to fabricate records during a forced refresh.
#[async_trait]
pub trait CacheSource: Send + Sync {
    type Key: Eq + Hash + Clone + Display + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the value for a key, creating a default record when the store
    /// does that implicitly
    async fn load(&self, key: &Self::Key) -> std::result::Result<Self::Value, Self::Error>;

    /// Fetch the value for a key without any implicit creation; `None` means
    /// the record genuinely does not exist
    async fn reload(
        &self,
        key: &Self::Key,
    ) -> std::result::Result<Option<Self::Value>, Self::Error>;
}
