//! Highlight regions for retrieved pages.
//!
//! Retrieval scores pages by their patch vectors; this module turns the
//! patches that won each query token back into pixel regions and outlines
//! them, optionally snapping them to OCR word boxes so outlines follow the
//! text rather than the model's grid.

pub mod compose;
pub mod draw;
pub mod encode;
pub mod geometry;

pub use compose::{refine_regions, select_patches, HighlightComposer, HighlightResult};
pub use geometry::Rect;
