//! Late-interaction scoring and top-k selection.
//!
//! Scoring is exhaustive: every page of the resolved index is scored against
//! every query token. There is no approximate pre-filter, so results are exact
//! and deterministic for a given index and query embedding.

pub mod maxsim;
pub mod select;
pub mod types;

pub use maxsim::{dot, late_interaction, max_sim, score_pages, PageScore};
pub use select::{compare_ranked, top_k};
pub use types::{ScoredPage, TokenMatch};
