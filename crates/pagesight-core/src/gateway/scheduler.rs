//! Embedding gateway trait definition.
//!
//! Retrieval and indexing code depends on this trait rather than on
//! [`SerialGateway`](super::SerialGateway) so the admission strategy can be
//! swapped (or faked in tests) without touching call sites.

use super::error::GatewayError;
use super::types::GatewayStats;
use crate::embedding::{MultiVector, PageEmbedding};
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;

/// Access to the exclusive embedding resource.
///
/// # Priority Handling
///
/// - `embed_query` is admitted as P0 and overtakes queued page requests
/// - `embed_page` is admitted as P1
///
/// Within the same priority level, requests are processed FIFO.
///
/// # Example
///
/// ```ignore
/// async fn query_vectors(gateway: &dyn EmbeddingGateway, text: &str) -> Result<MultiVector, GatewayError> {
///     gateway.embed_query(text).await
/// }
/// ```
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Embeds one rendered page.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if:
    /// - The admission deadline passes before the request starts
    /// - The model fails
    /// - The gateway is shutting down
    async fn embed_page(&self, image: Arc<RgbImage>) -> Result<PageEmbedding, GatewayError>;

    /// Embeds query text with query priority.
    ///
    /// # Errors
    ///
    /// Same as [`embed_page`](Self::embed_page).
    async fn embed_query(&self, text: &str) -> Result<MultiVector, GatewayError>;

    /// Get gateway statistics.
    fn stats(&self) -> GatewayStats;
}
