use thiserror::Error;

/// Errors produced when parsing or validating Cask types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid cache id: {0}")]
    InvalidCacheId(String),

    #[error("invalid cache hash {value:?}: {reason}")]
    InvalidCacheHash { value: String, reason: String },

    #[error("invalid namespace {name:?}: {reason}")]
    InvalidNamespace { name: String, reason: String },

    #[error("unknown data type: {0}")]
    UnknownDataType(String),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
