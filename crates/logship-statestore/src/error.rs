//! Error types for the state registry.

use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// I/O error while reading or writing the backing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A typed decode failed for the given key.
    #[error("Decode error for key '{key}': {message}")]
    Decode { key: String, message: String },
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, StateStoreError>;
