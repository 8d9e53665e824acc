//! Error types for pipeline connections.

use thiserror::Error;

/// Errors raised while connecting to or publishing through a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Failed to establish a client connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The pipeline has been shut down and accepts no more clients.
    #[error("Pipeline is closed")]
    Closed,
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
