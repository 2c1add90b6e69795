//! Error types for LineraDB
//!
//! Provides a unified error type for all storage operations.
//! A missing key is never an error: lookups return `Ok(None)`.

use thiserror::Error;

/// Result type alias using LineraError
pub type Result<T> = std::result::Result<T, LineraError>;

/// Unified error type for LineraDB operations
#[derive(Debug, Error)]
pub enum LineraError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Manifest Errors
    // -------------------------------------------------------------------------
    #[error("Manifest conflict: {0}")]
    ManifestConflict(String),

    // -------------------------------------------------------------------------
    // Write Path Errors
    // -------------------------------------------------------------------------
    #[error("Engine is read-only after a failed WAL write")]
    ReadOnly,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Background Work Errors
    // -------------------------------------------------------------------------
    #[error("Operation cancelled")]
    Cancelled,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl LineraError {
    /// Whether a background flush/compaction hitting this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, LineraError::Io(_) | LineraError::ManifestConflict(_))
    }
}

impl From<bincode::Error> for LineraError {
    fn from(e: bincode::Error) -> Self {
        LineraError::Serialization(e.to_string())
    }
}
