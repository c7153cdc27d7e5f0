//! Highlight composition for retrieved pages.

use super::draw::{draw_outline, fill_translucent};
use super::geometry::Rect;
use crate::config::RetrievalConfig;
use crate::embedding::PatchGrid;
use crate::index::{IndexId, PageRecord};
use crate::ocr::{OcrBox, OcrCache, OcrEngine, OcrKey};
use crate::search::{ScoredPage, TokenMatch};
use image::RgbImage;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fill colour for keyword highlights.
const KEYWORD_FILL: [u8; 3] = [255, 255, 0];

/// Opacity of keyword highlights.
const KEYWORD_ALPHA: f32 = 0.5;

/// A page copy with the matched regions drawn on it.
#[derive(Debug, Clone)]
pub struct HighlightResult {
    /// 0-based page number
    pub page_number: u32,
    /// Copy of the page raster with regions drawn on it
    pub overlay: RgbImage,
    /// Regions drawn, in image pixel coordinates
    pub regions: Vec<Rect>,
    /// True when OCR was unavailable and regions were not refined
    pub ocr_degraded: bool,
}

/// Turns a page's per-token best patches into outlined regions.
///
/// The steps are:
///
/// 1. Collapse repeated patch indices, keeping each patch's best similarity
/// 2. Keep the `highlight_patches` most similar patches
/// 3. Map each patch to its pixel rectangle through the page's [`PatchGrid`]
/// 4. Snap each rectangle to the OCR words it covers, if any
/// 5. Outline the resulting regions on a copy of the page
///
/// OCR failure is not an error: the raw patch rectangles are drawn instead
/// and the result is flagged `ocr_degraded`.
pub struct HighlightComposer {
    ocr: Option<Arc<dyn OcrEngine>>,
    cache: Arc<OcrCache>,
    max_patches: usize,
    min_ocr_overlap: f32,
    outline_width: u32,
    outline_color: [u8; 3],
}

impl HighlightComposer {
    /// Creates a composer. Pass `None` for `ocr` to skip refinement.
    pub fn new(
        ocr: Option<Arc<dyn OcrEngine>>,
        cache: Arc<OcrCache>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            ocr,
            cache,
            max_patches: config.highlight_patches,
            min_ocr_overlap: config.min_ocr_overlap,
            outline_width: config.outline_width,
            outline_color: config.outline_color,
        }
    }

    /// The OCR cache this composer reads and fills.
    pub fn cache(&self) -> &Arc<OcrCache> {
        &self.cache
    }

    /// Composes the highlight for one scored page of index `index_id`.
    pub async fn compose(
        &self,
        index_id: IndexId,
        page: &PageRecord,
        scored: &ScoredPage,
    ) -> HighlightResult {
        let image = page.image();
        let patch_rects: Vec<Rect> = select_patches(&scored.per_token_best_patch, self.max_patches)
            .iter()
            .filter_map(|m| patch_rect_in_image(page.grid(), m.patch_index, image))
            .collect();

        let key = (index_id, page.document_id(), page.page_number());
        let (words, ocr_degraded) = self.words(key, image).await;
        let regions = match words {
            Some(words) => refine_regions(&patch_rects, &words, self.min_ocr_overlap),
            None => dedup_regions(patch_rects),
        };

        let mut overlay = RgbImage::clone(image);
        for region in &regions {
            draw_outline(&mut overlay, region, self.outline_width, self.outline_color);
        }
        debug!(
            "Highlighted {} regions on document {} page {}",
            regions.len(),
            page.document_id(),
            page.page_number()
        );

        HighlightResult {
            page_number: page.page_number(),
            overlay,
            regions,
            ocr_degraded,
        }
    }

    /// Fills every OCR word that contains one of `keywords`.
    ///
    /// Matching ignores case and spaces, so `"net income"` matches the word
    /// `"NetIncome:"`. Blank keywords are ignored. Without OCR the page is
    /// returned unchanged with `ocr_degraded` set.
    pub async fn highlight_keywords(
        &self,
        key: OcrKey,
        image: &RgbImage,
        keywords: &[String],
    ) -> HighlightResult {
        let needles: Vec<String> = keywords
            .iter()
            .map(|k| normalize_word(k))
            .filter(|k| !k.is_empty())
            .collect();

        let (words, ocr_degraded) = self.words(key, image).await;
        let mut overlay = image.clone();
        let mut regions = Vec::new();

        if let Some(words) = words {
            for word in words.iter() {
                let text = normalize_word(&word.text);
                if needles.iter().any(|n| text.contains(n.as_str())) && !regions.contains(&word.rect)
                {
                    fill_translucent(&mut overlay, &word.rect, KEYWORD_FILL, KEYWORD_ALPHA);
                    regions.push(word.rect);
                }
            }
        }

        HighlightResult {
            page_number: key.2,
            overlay,
            regions,
            ocr_degraded,
        }
    }

    /// OCR words for a page, or `None` (degraded) when OCR is unavailable.
    async fn words(&self, key: OcrKey, image: &RgbImage) -> (Option<Arc<Vec<OcrBox>>>, bool) {
        let Some(engine) = &self.ocr else {
            return (None, true);
        };
        match self.cache.get_or_detect(key, image, engine.as_ref()).await {
            Ok(words) => (Some(words), false),
            Err(e) => {
                warn!(
                    "OCR failed for document {} page {}, highlighting without it: {}",
                    key.1, key.2, e
                );
                (None, true)
            }
        }
    }
}

/// Distinct patches, each with its best similarity, strongest first.
///
/// Keeps at most `max_patches`; equal similarities keep the lower patch index.
pub fn select_patches(matches: &[TokenMatch], max_patches: usize) -> Vec<TokenMatch> {
    let mut best: BTreeMap<usize, f32> = BTreeMap::new();
    for m in matches {
        best.entry(m.patch_index)
            .and_modify(|s| {
                if m.similarity > *s {
                    *s = m.similarity;
                }
            })
            .or_insert(m.similarity);
    }

    let mut selected: Vec<TokenMatch> = best
        .into_iter()
        .map(|(patch_index, similarity)| TokenMatch {
            patch_index,
            similarity,
        })
        .collect();
    selected.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.patch_index.cmp(&b.patch_index))
    });
    selected.truncate(max_patches);
    selected
}

/// Replaces each patch rectangle with the bounding box of the OCR words it
/// mostly covers.
///
/// A word counts when at least `min_overlap` of its own area lies inside the
/// patch. A patch covering no word keeps its own rectangle. Identical regions
/// are emitted once, in first-seen order.
pub fn refine_regions(patch_rects: &[Rect], words: &[OcrBox], min_overlap: f32) -> Vec<Rect> {
    let regions = patch_rects
        .iter()
        .map(|patch| {
            words
                .iter()
                .filter(|w| {
                    w.rect.intersection(patch).is_some()
                        && w.rect.overlap_fraction(patch) >= min_overlap
                })
                .map(|w| w.rect)
                .reduce(|a, b| a.union(&b))
                .unwrap_or(*patch)
        })
        .collect();
    dedup_regions(regions)
}

fn dedup_regions(regions: Vec<Rect>) -> Vec<Rect> {
    let mut unique: Vec<Rect> = Vec::with_capacity(regions.len());
    for region in regions {
        if !unique.contains(&region) {
            unique.push(region);
        }
    }
    unique
}

/// Patch rectangle scaled from grid space into the raster's pixel space.
///
/// The two coincide unless the model reported a grid over a resized page.
fn patch_rect_in_image(grid: &PatchGrid, patch_index: usize, image: &RgbImage) -> Option<Rect> {
    let rect = grid.patch_rect(patch_index)?;
    if grid.page_width == image.width() && grid.page_height == image.height() {
        return Some(rect);
    }
    if grid.page_width == 0 || grid.page_height == 0 {
        return None;
    }

    let sx = |v: u32| (v as u64 * image.width() as u64 / grid.page_width as u64) as u32;
    let sy = |v: u32| (v as u64 * image.height() as u64 / grid.page_height as u64) as u32;
    let x0 = sx(rect.x);
    let y0 = sy(rect.y);
    Some(Rect::new(
        x0,
        y0,
        sx(rect.right()) - x0,
        sy(rect.bottom()) - y0,
    ))
}

fn normalize_word(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
