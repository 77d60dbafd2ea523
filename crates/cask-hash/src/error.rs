/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("hash length {length} out of range for {algorithm} (1..={max})")]
    InvalidLength {
        algorithm: String,
        length: usize,
        max: usize,
    },

    #[error("JSON field not found: {0}")]
    FieldNotFound(String),
}

/// Result alias for hashing operations.
pub type HashResult<T> = Result<T, HashError>;
