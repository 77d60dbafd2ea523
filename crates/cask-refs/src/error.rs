//! Error types for reference operations.

use cask_store::StoreError;
use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// A cache key, data key, or file id failed validation.
    #[error("invalid {kind} {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// The strategy needs a cache key and none was given.
    #[error("strategy {0} requires a cache key")]
    MissingCacheKey(String),

    /// The in-process lock table was poisoned.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Failure in the underlying storage backend.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
