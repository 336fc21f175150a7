//! Error types for Quotagate.

use thiserror::Error;

/// Errors raised by a storage backend.
///
/// These propagate to the caller unmodified; the limiter never retries a
/// failed load or save and never guesses a decision on its behalf.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within its configured bound
    #[error("storage operation timed out after {0} ms")]
    Timeout(u64),
}

/// Main error type for Quotagate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller supplied an unusable key
    #[error("Invalid key: rate limit keys must be non-empty")]
    InvalidKey,

    /// Storage collaborator failures
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Optimistic updates kept losing to concurrent writers
    #[error("Gave up updating rate state for key {key} after {attempts} conflicting attempts")]
    Contention { key: String, attempts: u32 },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Quotagate operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// Result type alias for storage backends.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
