//! Cache-related error types

use thiserror::Error;

/// Errors surfaced by cache operations.
///
/// Source errors pass through untouched so callers can tell a failed lookup
/// apart from a record that simply does not exist.
#[derive(Error, Debug)]
pub enum CacheError<E>
where
    E: std::error::Error,
{
    /// A forced reload found no backing record. Raised by `refresh` only;
    /// `get` delegates absence handling to the source.
    #[error("no backing record for cache key `{key}`")]
    NotFound { key: String },

    /// The backing source failed while loading
    #[error(transparent)]
    Source(E),
}

impl<E> CacheError<E>
where
    E: std::error::Error,
{
    /// Unwrap the source error, if that is what this is
    pub fn into_source(self) -> Option<E> {
        match self {
            CacheError::Source(e) => Some(e),
            CacheError::NotFound { .. } => None,
        }
    }
}

/// Result type for cache operations
pub type Result<T, E> = std::result::Result<T, CacheError<E>>;
