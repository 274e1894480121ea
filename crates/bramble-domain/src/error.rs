//! Error types for the domain model

use thiserror::Error;

/// Result type for domain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while working with permission data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed permission node `{0}`")]
    MalformedNode(String),

    #[error("unknown entity type `{0}`")]
    UnknownEntityType(String),
}
