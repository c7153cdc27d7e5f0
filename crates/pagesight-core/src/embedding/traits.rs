//! Trait for the vision-language embedding model.

use super::types::{MultiVector, PageEmbedding};
use crate::error::EmbeddingError;
use image::RgbImage;

/// Vision-language embedding model operations.
///
/// Implementations produce late-interaction embeddings: one vector per image
/// patch for pages and one vector per token for queries, all of the same
/// dimension.
///
/// # Thread Affinity
///
/// The trait has no `Send`/`Sync` bound. The gateway constructs the embedder
/// on its worker thread through a factory closure and never moves it, so
/// accelerator handles that must stay on one thread are fine.
///
/// # Examples
///
/// ```ignore
/// let gateway = SerialGateway::start(
///     || Ok(Box::new(HttpPageEmbedder::new(config)?) as Box<dyn PageEmbedder>),
///     Duration::from_secs(30),
/// ).await?;
/// ```
pub trait PageEmbedder {
    /// Embeds a rendered page raster into patch vectors plus the grid they
    /// were computed on.
    fn embed_page(&self, image: &RgbImage) -> Result<PageEmbedding, EmbeddingError>;

    /// Embeds query text into token vectors.
    fn embed_query(&self, text: &str) -> Result<MultiVector, EmbeddingError>;
}

impl<T: PageEmbedder + ?Sized> PageEmbedder for Box<T> {
    fn embed_page(&self, image: &RgbImage) -> Result<PageEmbedding, EmbeddingError> {
        (**self).embed_page(image)
    }

    fn embed_query(&self, text: &str) -> Result<MultiVector, EmbeddingError> {
        (**self).embed_query(text)
    }
}
