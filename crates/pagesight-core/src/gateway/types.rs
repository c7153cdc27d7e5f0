//! Core types for the embedding gateway.

use crate::embedding::{MultiVector, PageEmbedding};
use image::RgbImage;
use std::cmp::Ordering;
use std::sync::Arc;

/// Request priority levels.
///
/// Lower values indicate higher priority. The gateway processes requests in
/// priority order, with FIFO ordering within each priority level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Priority {
    /// P0: Query embedding - a user is waiting on a chat answer
    Immediate = 0,

    /// P1: Page embedding - indexing an upload or the bundled corpus
    Background = 1,
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lower value = higher priority
        (*self as u8).cmp(&(*other as u8))
    }
}

/// What to embed.
#[derive(Debug, Clone)]
pub enum EmbedInput {
    /// Rendered page raster
    Page(Arc<RgbImage>),
    /// Query text
    Query(String),
}

impl EmbedInput {
    /// Priority class this input is admitted with.
    pub fn priority(&self) -> Priority {
        match self {
            EmbedInput::Page(_) => Priority::Background,
            EmbedInput::Query(_) => Priority::Immediate,
        }
    }
}

/// Result of an embedding request.
#[derive(Debug, Clone)]
pub enum EmbedOutput {
    /// Patch vectors and grid for a page
    Page(PageEmbedding),
    /// Token vectors for a query
    Query(MultiVector),
}

/// Gateway statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Name of the gateway implementation
    pub gateway_name: &'static str,
    /// Requests submitted but not yet picked up by the worker
    pub queue_depth: usize,
    /// Requests that ran on the model (successfully or not)
    pub requests_completed: u64,
    /// Requests that hit their admission deadline before starting
    pub requests_timed_out: u64,
    /// Requests dropped by their caller before starting
    pub requests_cancelled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Immediate < Priority::Background);
    }

    #[test]
    fn test_input_priority() {
        let page = EmbedInput::Page(Arc::new(RgbImage::new(1, 1)));
        let query = EmbedInput::Query("revenue".to_string());
        assert_eq!(page.priority(), Priority::Background);
        assert_eq!(query.priority(), Priority::Immediate);
    }
}
