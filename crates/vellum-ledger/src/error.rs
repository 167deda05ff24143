//! Ledger error types.

use thiserror::Error;
use vellum_storage::StorageError;

/// Errors returned by ledger operations.
///
/// Only [`StoreUnavailable`](Self::StoreUnavailable) is worth retrying.
/// Every other variant is a permanent outcome for the request that
/// produced it.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The request is missing a field or a field is malformed.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Transient storage fault. Safe to retry with backoff.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// An update or delete of committed data was refused.
    #[error("immutability violation: {0}")]
    ImmutabilityViolation(String),

    /// No record with the given id.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Malformed read request.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Stored bytes could not be decoded, or a record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The ledger cannot be built from the supplied configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    /// Whether the caller may retry the failed operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Immutable(msg) => Self::ImmutabilityViolation(msg),
            StorageError::AlreadyExists(msg) => {
                Self::ConstraintViolation(format!("key already exists: {msg}"))
            },
            StorageError::InvalidKey(msg) => Self::ConstraintViolation(msg),
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::Serialization(msg) => Self::Serialization(msg),
            StorageError::Internal(msg) | StorageError::Connection(msg) => {
                Self::StoreUnavailable(msg)
            },
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
