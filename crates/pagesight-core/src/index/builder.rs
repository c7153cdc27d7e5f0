//! Builds page indexes by embedding page rasters through the gateway.

use super::corpus::CorpusIndex;
use super::progress::{CorpusProgress, IndexingProgress};
use super::types::{DocumentId, DocumentPages, PageRecord};
use crate::error::RetrievalError;
use crate::gateway::EmbeddingGateway;
use crate::metrics::global_metrics;
use image::RgbImage;
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A document waiting to be indexed: its id, display name and page rasters in
/// page order.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Id the document will carry in the index
    pub id: DocumentId,
    /// Display name
    pub name: String,
    /// Page rasters, page 0 first
    pub pages: Vec<Arc<RgbImage>>,
}

/// Embeds documents page by page and assembles immutable indexes.
///
/// Every page goes through the gateway at background priority, one at a time
/// and in page order, so a concurrent query is never stuck behind more than
/// the single page currently being embedded. A build either completes fully
/// or fails with nothing produced.
pub struct CorpusBuilder {
    gateway: Arc<dyn EmbeddingGateway>,
}

impl CorpusBuilder {
    /// Creates a builder that embeds through `gateway`.
    pub fn new(gateway: Arc<dyn EmbeddingGateway>) -> Self {
        Self { gateway }
    }

    /// Embeds every page of one document.
    ///
    /// `on_progress` is called after each page.
    ///
    /// # Errors
    ///
    /// `RetrievalError::IndexingFailed` naming the offending page if any page
    /// fails to embed, comes back with zero patches, or has a grid that does
    /// not match its patch count. An empty page list also fails.
    #[instrument(skip_all, fields(document = %document_id, pages = pages.len()))]
    pub async fn build_document<F>(
        &self,
        document_id: DocumentId,
        name: &str,
        pages: Vec<Arc<RgbImage>>,
        mut on_progress: F,
    ) -> Result<DocumentPages, RetrievalError>
    where
        F: FnMut(&IndexingProgress) + Send,
    {
        if pages.is_empty() {
            return Err(RetrievalError::IndexingFailed {
                document: document_id,
                page: None,
                reason: "document has no pages".to_string(),
            });
        }

        let start = Instant::now();
        let total = pages.len();
        let mut records = Vec::with_capacity(total);

        for (page_number, image) in pages.into_iter().enumerate() {
            let page_number = page_number as u32;
            let page_start = Instant::now();

            let embedding = self
                .gateway
                .embed_page(image.clone())
                .await
                .map_err(|e| {
                    warn!("Embedding page {} of '{}' failed: {}", page_number, name, e);
                    RetrievalError::IndexingFailed {
                        document: document_id,
                        page: Some(page_number),
                        reason: e.to_string(),
                    }
                })?;

            let record = PageRecord::new(
                document_id,
                page_number,
                embedding.patches,
                embedding.grid,
                image,
            )?;
            records.push(record);

            global_metrics().record_page_indexing(page_start.elapsed().as_secs_f64() * 1000.0);
            let progress = IndexingProgress::new(
                records.len(),
                total,
                start.elapsed().as_millis() as u64,
            );
            debug!(
                "Embedded page {}/{} of '{}'",
                progress.pages_completed, total, name
            );
            on_progress(&progress);
        }

        let document = DocumentPages::new(document_id, name, records)?;
        info!(
            "Indexed '{}' ({} pages) in {:.1}ms",
            name,
            total,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(document)
    }

    /// Builds a single-document index, as used for session uploads.
    pub async fn build(
        &self,
        document_id: DocumentId,
        name: &str,
        pages: Vec<Arc<RgbImage>>,
    ) -> Result<CorpusIndex, RetrievalError> {
        let document = self.build_document(document_id, name, pages, |_| {}).await?;
        CorpusIndex::new(vec![document])
    }

    /// Builds a multi-document index, as used for the primary corpus.
    ///
    /// Documents are embedded one after another. The first failure aborts
    /// the whole build.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn build_corpus<F>(
        &self,
        documents: Vec<SourceDocument>,
        mut on_progress: F,
    ) -> Result<CorpusIndex, RetrievalError>
    where
        F: FnMut(&CorpusProgress) + Send,
    {
        let mut progress = CorpusProgress::new(documents.len());
        let mut built = Vec::with_capacity(documents.len());

        for source in documents {
            progress.current_document = Some(source.name.clone());
            progress.current = None;
            on_progress(&progress);

            let document = self
                .build_document(source.id, &source.name, source.pages, |page_progress| {
                    progress.current = Some(page_progress.clone());
                    on_progress(&progress);
                })
                .await?;
            built.push(document);

            progress.documents_completed += 1;
            progress.current_document = None;
            progress.current = None;
            on_progress(&progress);
        }

        let index = CorpusIndex::new(built)?;
        info!(
            "Corpus index ready: {} documents, {} pages",
            index.document_count(),
            index.page_count()
        );
        Ok(index)
    }
}
