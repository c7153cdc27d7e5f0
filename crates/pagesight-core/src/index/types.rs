use crate::embedding::{MultiVector, PatchGrid};
use crate::error::RetrievalError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Document identifier within one corpus index.
///
/// Ids are assigned by whoever builds the index (the corpus loader numbers
/// documents in sorted-name order). They are only unique within an index:
/// two sessions may both hold a document with id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Creates a DocumentId from a raw u64 value.
    pub const fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value of this ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque session key supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a session key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the session key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Global counter for generating unique index IDs.
static INDEX_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-unique identifier of one built [`CorpusIndex`](super::CorpusIndex).
///
/// Used to key per-index caches (OCR results) so that entries from a replaced
/// or foreign index can never be confused with the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexId(u64);

impl IndexId {
    /// Generates a new unique index ID.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(INDEX_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Returns the raw u64 value of this ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Which index a query runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    /// The whole primary corpus
    Primary,
    /// A single document of the primary corpus
    Document(DocumentId),
    /// The ephemeral index of a session's latest upload
    Session(SessionId),
}

/// One indexed page: its patch vectors, grid and raster.
///
/// Construction validates the page so that a built index never holds a page
/// that cannot be scored or highlighted.
#[derive(Debug, Clone)]
pub struct PageRecord {
    document_id: DocumentId,
    page_number: u32,
    patches: MultiVector,
    grid: PatchGrid,
    image: Arc<RgbImage>,
}

impl PageRecord {
    /// Creates a validated page record.
    ///
    /// # Errors
    ///
    /// `RetrievalError::IndexingFailed` if the page has no patch vectors or
    /// the grid does not account for exactly one cell per patch.
    pub fn new(
        document_id: DocumentId,
        page_number: u32,
        patches: MultiVector,
        grid: PatchGrid,
        image: Arc<RgbImage>,
    ) -> Result<Self, RetrievalError> {
        let fail = |reason: String| RetrievalError::IndexingFailed {
            document: document_id,
            page: Some(page_number),
            reason,
        };

        if patches.is_empty() {
            return Err(fail("page produced no patch vectors".to_string()));
        }
        if grid.len() != patches.rows() {
            return Err(fail(format!(
                "grid {}x{} does not match {} patch vectors",
                grid.columns,
                grid.rows,
                patches.rows()
            )));
        }

        Ok(Self {
            document_id,
            page_number,
            patches,
            grid,
            image,
        })
    }

    /// Document this page belongs to.
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// 0-based page number.
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    /// Patch vectors in grid order.
    pub fn patches(&self) -> &MultiVector {
        &self.patches
    }

    /// Grid the patches were computed on.
    pub fn grid(&self) -> &PatchGrid {
        &self.grid
    }

    /// Page raster as rendered for the model.
    pub fn image(&self) -> &Arc<RgbImage> {
        &self.image
    }
}

/// All pages of one document, in page order.
#[derive(Debug, Clone)]
pub struct DocumentPages {
    id: DocumentId,
    name: String,
    pages: Vec<PageRecord>,
}

impl DocumentPages {
    /// Groups pages into a document.
    ///
    /// # Errors
    ///
    /// `RetrievalError::IndexingFailed` if the document is empty, if a page
    /// belongs to another document, or if page numbers are not contiguous
    /// from 0.
    pub fn new(
        id: DocumentId,
        name: impl Into<String>,
        pages: Vec<PageRecord>,
    ) -> Result<Self, RetrievalError> {
        if pages.is_empty() {
            return Err(RetrievalError::IndexingFailed {
                document: id,
                page: None,
                reason: "document has no pages".to_string(),
            });
        }
        for (expected, page) in pages.iter().enumerate() {
            if page.document_id() != id {
                return Err(RetrievalError::IndexingFailed {
                    document: id,
                    page: Some(page.page_number()),
                    reason: format!("page belongs to document {}", page.document_id()),
                });
            }
            if page.page_number() as usize != expected {
                return Err(RetrievalError::IndexingFailed {
                    document: id,
                    page: Some(page.page_number()),
                    reason: format!("expected page number {}", expected),
                });
            }
        }
        Ok(Self {
            id,
            name: name.into(),
            pages,
        })
    }

    /// Document id.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Display name (file or folder name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pages in page order.
    pub fn pages(&self) -> &[PageRecord] {
        &self.pages
    }

    /// Page by number.
    pub fn page(&self, page_number: u32) -> Option<&PageRecord> {
        self.pages.get(page_number as usize)
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Always false for a validated document.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doc: u64, page: u32, rows: usize) -> Result<PageRecord, RetrievalError> {
        let patches = MultiVector::new(vec![0.5; rows * 3], 3).unwrap();
        PageRecord::new(
            DocumentId::from_u64(doc),
            page,
            patches,
            PatchGrid::new(2, 2, 8, 8),
            Arc::new(RgbImage::new(8, 8)),
        )
    }

    #[test]
    fn test_index_ids_are_unique() {
        let a = IndexId::new();
        let b = IndexId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_page_record_rejects_zero_patches() {
        let err = record(1, 0, 0).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::IndexingFailed {
                page: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn test_page_record_rejects_grid_mismatch() {
        assert!(record(1, 0, 3).is_err());
        assert!(record(1, 0, 4).is_ok());
    }

    #[test]
    fn test_document_requires_contiguous_pages() {
        let pages = vec![record(1, 0, 4).unwrap(), record(1, 2, 4).unwrap()];
        let err = DocumentPages::new(DocumentId::from_u64(1), "doc", pages).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::IndexingFailed {
                page: Some(2),
                ..
            }
        ));
    }

    #[test]
    fn test_document_rejects_foreign_page() {
        let pages = vec![record(2, 0, 4).unwrap()];
        assert!(DocumentPages::new(DocumentId::from_u64(1), "doc", pages).is_err());
    }

    #[test]
    fn test_document_rejects_empty() {
        assert!(DocumentPages::new(DocumentId::from_u64(1), "doc", Vec::new()).is_err());
    }

    #[test]
    fn test_session_display() {
        assert_eq!(SessionId::new("abc").to_string(), "abc");
        assert_eq!(DocumentId::from_u64(7).to_string(), "7");
    }
}
