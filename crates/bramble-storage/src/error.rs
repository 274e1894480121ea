//! Error types for the storage layer

use bramble_domain::EntityType;
use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while reading or writing permission records
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("member `{id}` with type `{kind}` not found")]
    MemberNotFound { id: String, kind: EntityType },

    #[error("permission group `{name}` not found")]
    GroupNotFound { name: String },

    /// Transient database failure; callers may retry. Never conflate this
    /// with a denied permission.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid permission payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid column value: {0}")]
    Decode(String),
}

impl StorageError {
    /// Whether the operation may succeed if retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Database(_))
    }
}
