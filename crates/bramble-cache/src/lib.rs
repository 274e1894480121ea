//! Keyed read-through caching for bramble services
//!
//! Provides [`KeyedCache`], an in-memory cache in front of an asynchronous
//! backing source. One loader runs per key at a time, entries never expire on
//! their own, and staleness is handled exclusively through explicit
//! invalidation by the owning service.

pub mod error;
pub mod keyed;
pub mod locks;
pub mod source;

pub use error::{CacheError, Result};
pub use keyed::KeyedCache;
pub use source::CacheSource;
