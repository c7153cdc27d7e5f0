//! Error types for pagesight-core.
//!
//! Each external collaborator (embedding model, OCR engine, answer service)
//! has its own error enum. [`RetrievalError`] is the typed error returned by
//! the public retrieval and indexing operations; gateway errors live next to
//! the gateway in [`crate::gateway::GatewayError`].

use crate::gateway::GatewayError;
use crate::index::{DocumentId, SessionId};
use thiserror::Error;

/// Errors raised by the embedding model.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// Model could not be constructed or reached
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    /// Input rejected by the model (empty image, unparsable text, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Forward pass or remote inference call failed
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    /// Model returned vectors that do not form a valid multi-vector
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
}

/// Errors raised by the OCR engine.
///
/// OCR is best effort: the highlight composer degrades to raw patch
/// rectangles when it sees one of these.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// OCR binary or service could not be started
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    /// OCR ran but reported a failure
    #[error("OCR failed: {0}")]
    Failed(String),
    /// OCR output could not be parsed
    #[error("Malformed OCR output: {0}")]
    MalformedOutput(String),
}

/// Errors raised by the answer-generation service.
#[derive(Debug, Clone, Error)]
pub enum AnswerError {
    /// Transport-level failure talking to the service
    #[error("Answer request failed: {0}")]
    Request(String),
    /// Service answered with a non-success status
    #[error("Answer service returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },
    /// Response body could not be decoded
    #[error("Malformed answer response: {0}")]
    MalformedResponse(String),
}

/// Errors returned by retrieval, indexing and answer operations.
///
/// An empty result set is not an error: `retrieve` returns `Ok(vec![])`.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    /// Query was empty, whitespace-only or embedded to zero tokens
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// Requested document is not part of the target index
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),
    /// Session has never uploaded a document (or has ended)
    #[error("Session {0} has no index")]
    SessionHasNoIndex(SessionId),
    /// Session ended while its upload was still being indexed; the build is discarded
    #[error("Session {0} ended before its upload finished")]
    SessionEnded(SessionId),
    /// A later upload for the same session started while this one was indexing
    #[error("Upload for session {0} was superseded by a newer upload")]
    UploadSuperseded(SessionId),
    /// A page could not be embedded or validated; the whole build is discarded
    #[error("Indexing failed for document {document} (page {page:?}): {reason}")]
    IndexingFailed {
        /// Document being built
        document: DocumentId,
        /// Offending page, if the failure is page-specific
        page: Option<u32>,
        /// Human-readable cause
        reason: String,
    },
    /// Gateway admission deadline passed before the request started
    #[error("Embedding resource busy: request waited {waited_ms}ms without starting")]
    ResourceTimeout {
        /// How long the request sat in the admission queue
        waited_ms: u64,
    },
    /// Embedding model failure, propagated as-is
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Answer service failure, propagated as-is
    #[error("Answer generation error: {0}")]
    AnswerGeneration(#[from] AnswerError),
    /// Query and page vectors disagree on dimensionality
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the indexed patch vectors
        expected: usize,
        /// Dimension that was received
        actual: usize,
    },
    /// Gateway worker is gone or its response channel broke
    #[error("Embedding gateway unavailable: {0}")]
    GatewayUnavailable(String),
    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<GatewayError> for RetrievalError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout { waited_ms } => RetrievalError::ResourceTimeout { waited_ms },
            GatewayError::Embedding(e) | GatewayError::ModelInit(e) => RetrievalError::Embedding(e),
            other => RetrievalError::GatewayUnavailable(other.to_string()),
        }
    }
}

/// Validates that a vector has the expected dimension.
///
/// Returns `Ok(())` if dimensions match, or `Err(RetrievalError::DimensionMismatch)` otherwise.
pub fn validate_dimension(expected: usize, actual: usize) -> Result<(), RetrievalError> {
    if actual == expected {
        Ok(())
    } else {
        Err(RetrievalError::DimensionMismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_timeout_maps_to_resource_timeout() {
        let err: RetrievalError = GatewayError::Timeout { waited_ms: 40 }.into();
        assert!(matches!(err, RetrievalError::ResourceTimeout { waited_ms: 40 }));
    }

    #[test]
    fn test_gateway_embedding_error_is_not_masked() {
        let err: RetrievalError =
            GatewayError::Embedding(EmbeddingError::InvalidInput("blank".to_string())).into();
        assert!(matches!(
            err,
            RetrievalError::Embedding(EmbeddingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_disconnect_maps_to_unavailable() {
        let err: RetrievalError = GatewayError::ChannelDisconnected.into();
        assert!(matches!(err, RetrievalError::GatewayUnavailable(_)));
    }

    #[test]
    fn test_validate_dimension() {
        assert!(validate_dimension(3, 3).is_ok());
        assert!(matches!(
            validate_dimension(3, 2),
            Err(RetrievalError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_indexing_failed_display() {
        let err = RetrievalError::IndexingFailed {
            document: DocumentId::from_u64(4),
            page: Some(2),
            reason: "no patches".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Indexing failed for document 4 (page Some(2)): no patches"
        );
    }
}
