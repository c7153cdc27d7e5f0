use crate::highlight::HighlightResult;
use crate::index::IndexId;
use crate::search::ScoredPage;
use image::RgbImage;
use std::sync::Arc;

/// One page returned by retrieval, in ranking order.
#[derive(Debug, Clone)]
pub struct RetrievedPage {
    /// Score and per-token matches
    pub page: ScoredPage,
    /// Outlined copy of the page
    pub highlight: HighlightResult,
    /// Display name of the page's document
    pub document_name: String,
    /// The unmodified page raster
    pub page_image: Arc<RgbImage>,
    /// Index the page was retrieved from
    pub index_id: IndexId,
}
