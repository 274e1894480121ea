//! Error types for the permission system

use bramble_domain::EntityType;
use bramble_storage::StorageError;
use thiserror::Error;

/// Result type for permission operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving or managing permissions
#[derive(Error, Debug)]
pub enum Error {
    /// A forced refresh named a member that has no stored record
    #[error("member `{id}` with type `{kind}` not found")]
    MemberNotFound { id: String, kind: EntityType },

    /// A forced refresh named a group that has no stored record
    #[error("permission group `{name}` not found")]
    GroupNotFound { name: String },

    #[error("checker `{0}` already registered")]
    CheckerAlreadyRegistered(String),

    /// The backing store failed; distinct from a denied permission
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    /// Whether the operation may succeed if retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(e) if e.is_retryable())
    }
}
