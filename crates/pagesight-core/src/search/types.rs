use crate::index::DocumentId;
use serde::Serialize;

/// Best-matching patch for one query token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TokenMatch {
    /// Index of the patch with the highest dot product (lowest index on ties)
    pub patch_index: usize,
    /// That dot product
    pub similarity: f32,
}

/// A page scored against a query.
///
/// `per_token_best_patch` has one entry per query token, in token order; the
/// highlight composer uses it to decide which regions to outline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPage {
    /// Document the page belongs to
    pub document_id: DocumentId,
    /// 0-based page number
    pub page_number: u32,
    /// Late-interaction score (sum over tokens of the best patch similarity)
    pub score: f32,
    /// Best patch per query token
    pub per_token_best_patch: Vec<TokenMatch>,
}
