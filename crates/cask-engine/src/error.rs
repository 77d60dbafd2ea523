use cask_hash::HashError;
use cask_refs::RefError;
use cask_store::StoreError;
use cask_types::{DataType, TypeError};
use thiserror::Error;

/// Coarse error classes a transport layer maps onto status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    UnsupportedMediaType,
    Storage,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported media type: expected {expected}, stored {stored}")]
    UnsupportedMediaType { expected: DataType, stored: DataType },

    /// The first write of a store failed; nothing was persisted.
    #[error("content write failed at {path}: {source}")]
    ContentWrite {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid archive: {0}")]
    Archive(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidInput(_) | Self::Archive(_) | Self::Type(_) => ErrorKind::InvalidInput,
            Self::Hash(HashError::FieldNotFound(_)) => ErrorKind::InvalidInput,
            Self::Ref(RefError::InvalidName { .. } | RefError::MissingCacheKey(_)) => {
                ErrorKind::InvalidInput
            }
            Self::Store(StoreError::InvalidPath { .. }) => ErrorKind::InvalidInput,
            Self::UnsupportedMediaType { .. } => ErrorKind::UnsupportedMediaType,
            Self::ContentWrite { .. } | Self::Store(_) | Self::Ref(_) => ErrorKind::Storage,
            Self::Config(_) | Self::Hash(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
