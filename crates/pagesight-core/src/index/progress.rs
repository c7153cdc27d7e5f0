//! Progress tracking types for page indexing.
//!
//! Page embedding is the slow part of indexing (one model call per page), so
//! builders report progress after every page.

/// Progress of building one document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexingProgress {
    /// Number of pages embedded so far
    pub pages_completed: usize,
    /// Total number of pages in the document
    pub pages_total: usize,
    /// Time elapsed since the document build started (milliseconds)
    pub elapsed_ms: u64,
}

impl IndexingProgress {
    /// Creates a new progress instance.
    pub fn new(pages_completed: usize, pages_total: usize, elapsed_ms: u64) -> Self {
        Self {
            pages_completed,
            pages_total,
            elapsed_ms,
        }
    }

    /// Returns the completion percentage (0.0 to 100.0).
    pub fn percent_complete(&self) -> f64 {
        if self.pages_total == 0 {
            0.0
        } else {
            (self.pages_completed as f64 / self.pages_total as f64) * 100.0
        }
    }

    /// Returns true if every page has been embedded.
    pub fn is_complete(&self) -> bool {
        self.pages_completed >= self.pages_total
    }

    /// Returns estimated time remaining in milliseconds, if computable.
    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        if self.pages_completed == 0 || self.pages_completed >= self.pages_total {
            return None;
        }
        let remaining = self.pages_total - self.pages_completed;
        let ms_per_page = self.elapsed_ms / self.pages_completed as u64;
        Some(remaining as u64 * ms_per_page)
    }
}

/// Progress of building a multi-document corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusProgress {
    /// Number of documents fully embedded
    pub documents_completed: usize,
    /// Total number of documents
    pub documents_total: usize,
    /// Name of the document being embedded
    pub current_document: Option<String>,
    /// Progress within the current document
    pub current: Option<IndexingProgress>,
}

impl CorpusProgress {
    /// Creates progress for a corpus of `documents_total` documents.
    pub fn new(documents_total: usize) -> Self {
        Self {
            documents_completed: 0,
            documents_total,
            current_document: None,
            current: None,
        }
    }

    /// Returns the document completion percentage (0.0 to 100.0).
    pub fn percent_complete(&self) -> f64 {
        if self.documents_total == 0 {
            0.0
        } else {
            (self.documents_completed as f64 / self.documents_total as f64) * 100.0
        }
    }

    /// Returns true if every document has been embedded.
    pub fn is_complete(&self) -> bool {
        self.documents_completed >= self.documents_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_complete() {
        let progress = IndexingProgress::new(1, 4, 400);
        assert!((progress.percent_complete() - 25.0).abs() < 0.01);
        assert!(!progress.is_complete());
        assert_eq!(IndexingProgress::new(0, 0, 0).percent_complete(), 0.0);
    }

    #[test]
    fn test_estimated_remaining() {
        let progress = IndexingProgress::new(2, 5, 1000);
        // 500ms per page, 3 pages left
        assert_eq!(progress.estimated_remaining_ms(), Some(1500));
        assert_eq!(IndexingProgress::new(0, 5, 0).estimated_remaining_ms(), None);
        assert_eq!(IndexingProgress::new(5, 5, 10).estimated_remaining_ms(), None);
    }

    #[test]
    fn test_corpus_progress() {
        let mut progress = CorpusProgress::new(2);
        assert!(!progress.is_complete());
        progress.documents_completed = 2;
        assert!(progress.is_complete());
        assert!((progress.percent_complete() - 100.0).abs() < 0.01);
    }
}
