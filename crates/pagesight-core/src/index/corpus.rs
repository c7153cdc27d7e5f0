//! Immutable multi-document page index.

use super::types::{DocumentId, DocumentPages, IndexId, PageRecord};
use crate::error::RetrievalError;
use std::collections::BTreeMap;

/// Read-only collection of embedded documents.
///
/// Built once and shared behind an `Arc`; it is never mutated afterwards, so
/// readers need no locking. Documents iterate in ascending id order and pages
/// in page order.
#[derive(Debug)]
pub struct CorpusIndex {
    id: IndexId,
    documents: BTreeMap<DocumentId, DocumentPages>,
    dim: usize,
}

impl CorpusIndex {
    /// Assembles an index from validated documents.
    ///
    /// # Errors
    ///
    /// - `RetrievalError::IndexingFailed` if a document id appears twice
    /// - `RetrievalError::DimensionMismatch` if pages disagree on vector dimension
    pub fn new(documents: Vec<DocumentPages>) -> Result<Self, RetrievalError> {
        let mut map = BTreeMap::new();
        let mut dim: Option<usize> = None;

        for document in documents {
            for page in document.pages() {
                let page_dim = page.patches().dim();
                match dim {
                    None => dim = Some(page_dim),
                    Some(expected) if expected != page_dim => {
                        return Err(RetrievalError::DimensionMismatch {
                            expected,
                            actual: page_dim,
                        });
                    }
                    Some(_) => {}
                }
            }

            let id = document.id();
            if map.insert(id, document).is_some() {
                return Err(RetrievalError::IndexingFailed {
                    document: id,
                    page: None,
                    reason: "duplicate document id".to_string(),
                });
            }
        }

        Ok(Self {
            id: IndexId::new(),
            documents: map,
            dim: dim.unwrap_or(0),
        })
    }

    /// Creates an index with no documents.
    pub fn empty() -> Self {
        Self {
            id: IndexId::new(),
            documents: BTreeMap::new(),
            dim: 0,
        }
    }

    /// Process-unique id of this index.
    pub fn id(&self) -> IndexId {
        self.id
    }

    /// Looks up a document.
    ///
    /// # Errors
    ///
    /// `RetrievalError::DocumentNotFound` if the id is not in this index.
    pub fn lookup(&self, document_id: DocumentId) -> Result<&DocumentPages, RetrievalError> {
        self.documents
            .get(&document_id)
            .ok_or(RetrievalError::DocumentNotFound(document_id))
    }

    /// Looks up one page.
    pub fn page(&self, document_id: DocumentId, page_number: u32) -> Option<&PageRecord> {
        self.documents.get(&document_id)?.page(page_number)
    }

    /// Documents in ascending id order.
    pub fn documents(&self) -> impl Iterator<Item = &DocumentPages> {
        self.documents.values()
    }

    /// Every page of every document, in document then page order.
    pub fn pages(&self) -> impl Iterator<Item = &PageRecord> {
        self.documents.values().flat_map(|d| d.pages().iter())
    }

    /// Number of documents.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Number of pages across all documents.
    pub fn page_count(&self) -> usize {
        self.documents.values().map(DocumentPages::len).sum()
    }

    /// Shared patch vector dimension (0 for an empty index).
    pub fn embedding_dim(&self) -> usize {
        self.dim
    }

    /// Returns true if the index has no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
