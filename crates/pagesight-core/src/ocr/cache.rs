//! Write-once cache of OCR results per indexed page.

use super::traits::{OcrBox, OcrEngine};
use crate::error::OcrError;
use crate::index::{DocumentId, IndexId};
use image::RgbImage;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Cache key: the page's index, document and page number.
///
/// Including the index id keeps two sessions' uploads (which both use
/// document id 0) apart, and makes entries of a replaced index unreachable.
pub type OcrKey = (IndexId, DocumentId, u32);

/// OCR results keyed by page.
///
/// Pages are immutable once indexed, so an entry never changes after it is
/// written. Failures are not cached: the next request for the page retries.
/// Two concurrent misses for the same page may both run OCR; the first
/// result stored wins.
///
/// Once an index is released its pages are never stored again, so a query
/// still running against a replaced index cannot leave entries behind.
#[derive(Default)]
pub struct OcrCache {
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<OcrKey, Arc<Vec<OcrBox>>>,
    released: HashSet<IndexId>,
}

impl OcrCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached boxes for a page, if present.
    pub fn get(&self, key: &OcrKey) -> Option<Arc<Vec<OcrBox>>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(key)
            .cloned()
    }

    /// Returns the cached boxes for a page, running `engine` on a miss.
    pub async fn get_or_detect(
        &self,
        key: OcrKey,
        image: &RgbImage,
        engine: &dyn OcrEngine,
    ) -> Result<Arc<Vec<OcrBox>>, OcrError> {
        if let Some(boxes) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(boxes);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let boxes = Arc::new(engine.detect(image).await?);
        debug!(
            "{} found {} words on document {} page {}",
            engine.name(),
            boxes.len(),
            key.1,
            key.2
        );

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.released.contains(&key.0) {
            return Ok(boxes);
        }
        Ok(state.entries.entry(key).or_insert(boxes).clone())
    }

    /// Drops every entry belonging to `index` and refuses new ones for it.
    pub fn evict_index(&self, index: IndexId) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.released.insert(index);
        let before = state.entries.len();
        state.entries.retain(|(id, _, _), _| *id != index);
        before - state.entries.len()
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation.
    pub fn hit_stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
