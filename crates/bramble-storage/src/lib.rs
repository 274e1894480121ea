//! SQLite persistence for bramble permission records
//!
//! Owns the two relational tables behind the permission system and exposes
//! the durable operations the cache layer reads through to: get-or-create
//! lookups, explicit finds, upserts, existence checks, and bulk listings.

pub mod error;
pub mod store;

pub use error::{Result, StorageError};
pub use store::PermissionStore;
