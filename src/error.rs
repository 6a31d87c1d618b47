//! Error types for streamkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StreamKvError
pub type Result<T> = std::result::Result<T, StreamKvError>;

/// Unified error type for streamkv operations
#[derive(Debug, Error)]
pub enum StreamKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Stream Errors
    // -------------------------------------------------------------------------
    #[error("Stream corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Precondition Errors
    // -------------------------------------------------------------------------
    #[error("Index {index} out of range (slots: {len})")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Invariant Errors
    // -------------------------------------------------------------------------
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Container requires load before use")]
    RequiresLoad,

    #[error("Duplicate key")]
    DuplicateKey,

    // -------------------------------------------------------------------------
    // Access Errors
    // -------------------------------------------------------------------------
    #[error("Container was modified during enumeration (expected generation {expected}, found {found})")]
    ConcurrentModification { expected: u64, found: u64 },

    #[error("Container access scope already entered")]
    ReentrantAccess,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for StreamKvError {
    fn from(err: bincode::Error) -> Self {
        StreamKvError::Serialization(err.to_string())
    }
}
