//! Trait for the answer-generation service.

use super::types::{ContextPage, ConversationTurn};
use crate::error::AnswerError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of answer text fragments, in order.
pub type TokenStream = BoxStream<'static, Result<String, AnswerError>>;

/// Multimodal answer service.
///
/// `query` is the composed query (conversation summary plus the latest user
/// message) and `context` the retrieved pages, best first.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Condenses earlier conversation turns into a short context string.
    async fn summarize(&self, turns: &[ConversationTurn]) -> Result<String, AnswerError>;

    /// Answers `query` from the page images in `context`.
    async fn generate(&self, query: &str, context: &[ContextPage]) -> Result<String, AnswerError>;

    /// Like [`generate`](Self::generate), yielding the answer as it is
    /// produced.
    ///
    /// The returned stream owns everything it needs; dropping it aborts the
    /// request.
    async fn generate_stream(
        &self,
        query: &str,
        context: &[ContextPage],
    ) -> Result<TokenStream, AnswerError>;

    /// Service name for logging.
    fn name(&self) -> &str;
}
