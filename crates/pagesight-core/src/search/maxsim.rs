//! MaxSim late-interaction scoring.
//!
//! For a query with token vectors `q_1..q_m` and a page with patch vectors
//! `p_1..p_n`:
//!
//! ```text
//! score = Σ_i max_j dot(q_i, p_j)
//! ```
//!
//! Raw dot products, no normalization: the embedding model already produces
//! vectors meant to be compared this way.

use super::types::{ScoredPage, TokenMatch};
use crate::embedding::MultiVector;
use crate::error::{validate_dimension, RetrievalError};
use crate::index::PageRecord;

/// Dot product of two equal-length vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// Score of one page plus the best patch per query token.
#[derive(Debug, Clone, PartialEq)]
pub struct PageScore {
    /// Sum of per-token maxima
    pub score: f32,
    /// One entry per query token
    pub matches: Vec<TokenMatch>,
}

/// Late-interaction score of `patches` against `query`.
///
/// Returns `None` if `patches` is empty. Both multi-vectors must share one
/// dimension; use [`max_sim`] for the checked version. On equal similarity
/// the lower patch index wins.
pub fn late_interaction(query: &MultiVector, patches: &MultiVector) -> Option<PageScore> {
    if patches.is_empty() {
        return None;
    }
    debug_assert_eq!(query.dim(), patches.dim());

    let mut matches = Vec::with_capacity(query.rows());
    let mut score = 0.0f32;

    for q in query.iter() {
        let mut best = TokenMatch {
            patch_index: 0,
            similarity: f32::NEG_INFINITY,
        };
        for (j, p) in patches.iter().enumerate() {
            let similarity = dot(q, p);
            // Strict comparison keeps the first (lowest) index on ties
            if j == 0 || similarity > best.similarity {
                best = TokenMatch {
                    patch_index: j,
                    similarity,
                };
            }
        }
        score += best.similarity;
        matches.push(best);
    }

    Some(PageScore { score, matches })
}

/// Scores one indexed page.
///
/// # Errors
///
/// - `RetrievalError::InvalidQuery` if the query has no tokens
/// - `RetrievalError::DimensionMismatch` if query and patch dimensions differ
/// - `RetrievalError::IndexingFailed` if the page has no patches
pub fn max_sim(query: &MultiVector, page: &PageRecord) -> Result<ScoredPage, RetrievalError> {
    if query.is_empty() {
        return Err(RetrievalError::InvalidQuery(
            "query produced no token embeddings".to_string(),
        ));
    }
    validate_dimension(page.patches().dim(), query.dim())?;

    let PageScore { score, matches } = late_interaction(query, page.patches()).ok_or_else(|| {
        RetrievalError::IndexingFailed {
            document: page.document_id(),
            page: Some(page.page_number()),
            reason: "page has no patch vectors".to_string(),
        }
    })?;

    Ok(ScoredPage {
        document_id: page.document_id(),
        page_number: page.page_number(),
        score,
        per_token_best_patch: matches,
    })
}

/// Scores every page yielded by `pages`, preserving their order.
pub fn score_pages<'a, I>(query: &MultiVector, pages: I) -> Result<Vec<ScoredPage>, RetrievalError>
where
    I: IntoIterator<Item = &'a PageRecord>,
{
    pages.into_iter().map(|page| max_sim(query, page)).collect()
}
