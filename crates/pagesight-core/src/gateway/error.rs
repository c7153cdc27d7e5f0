//! Error types for the embedding gateway.

use crate::error::EmbeddingError;
use thiserror::Error;

/// Errors that can occur in the embedding gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Failed to spawn the worker thread
    #[error("Failed to spawn embedding worker thread: {0}")]
    ThreadSpawnFailed(String),

    /// Embedding model could not be constructed on the worker thread
    #[error("Embedding model initialization failed: {0}")]
    ModelInit(EmbeddingError),

    /// Request channel disconnected (gateway shutting down)
    #[error("Embedding gateway channel disconnected")]
    ChannelDisconnected,

    /// Response channel failed
    #[error("Response channel failed: {0}")]
    ResponseFailed(String),

    /// Admission deadline passed before the request started
    #[error("Request timed out after waiting {waited_ms}ms in the admission queue")]
    Timeout {
        /// Time spent queued
        waited_ms: u64,
    },

    /// The model rejected or failed the request
    #[error("Embedding failed: {0}")]
    Embedding(EmbeddingError),

    /// Worker answered a page request with a query result or vice versa
    #[error("Unexpected embedding output kind")]
    UnexpectedOutput,
}

impl From<GatewayError> for String {
    fn from(err: GatewayError) -> String {
        err.to_string()
    }
}
