//! Deterministic top-k selection over scored pages.

use super::types::ScoredPage;
use std::cmp::Ordering;

/// Total ranking order: score descending, then document id ascending, then
/// page number ascending.
///
/// Uses `f32::total_cmp`, so the order is total even in the presence of NaN
/// or signed zeros.
pub fn compare_ranked(a: &ScoredPage, b: &ScoredPage) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.document_id.cmp(&b.document_id))
        .then_with(|| a.page_number.cmp(&b.page_number))
}

/// Returns the `min(k, pages.len())` best pages in ranking order.
///
/// `k = 0` returns an empty vector. Scores are taken as given; nothing is
/// re-scored.
pub fn top_k(mut pages: Vec<ScoredPage>, k: usize) -> Vec<ScoredPage> {
    if k == 0 {
        return Vec::new();
    }
    if k < pages.len() {
        pages.select_nth_unstable_by(k - 1, compare_ranked);
        pages.truncate(k);
    }
    pages.sort_by(compare_ranked);
    pages
}
