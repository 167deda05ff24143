//! Storage error types.

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested key or item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An insert targeted a key that is already present.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A write-once store refused to overwrite or remove a committed key.
    #[error("immutable: {0}")]
    Immutable(String),

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Internal(String),

    /// Connection to the storage backend failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The namespace or key is invalid.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    /// Whether the failure is a transient infrastructure fault that a caller
    /// may retry with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Connection(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
