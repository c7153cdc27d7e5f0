//! # Pagesight Core
//!
//! Visual retrieval engine for document pages. Pages are indexed by the
//! multi-vector embeddings a vision-language model produces for their rendered
//! rasters (one vector per image patch), queries are scored against them with
//! late interaction (MaxSim), and the winning pages come back with the regions
//! that matched outlined on a copy of the page.
//!
//! ## Modules
//!
//! - [`gateway`] - Serialized admission to the single embedding accelerator
//! - [`index`] - Immutable page indexes, the primary corpus and per-session uploads
//! - [`search`] - MaxSim scoring and deterministic top-k selection
//! - [`highlight`] - Patch-to-region mapping, OCR refinement and overlay drawing
//! - [`ocr`] - OCR engine abstraction, Tesseract driver and result cache
//! - [`retrieval`] - The public `retrieve` entry point wiring the stages together
//! - [`answer`] - Conversation handling and answer generation over retrieved pages
//! - [`embedding`] - Embedding model abstraction and multi-vector types
//! - [`config`] - Production defaults and runtime configuration
//! - [`error`] - Error types shared across the crate
//! - [`metrics`] - Rolling performance metrics

pub mod answer;
pub mod config;
pub mod embedding;
pub mod error;
pub mod gateway;
pub mod highlight;
pub mod index;
pub mod metrics;
pub mod ocr;
pub mod retrieval;
pub mod search;

#[cfg(test)]
pub(crate) mod test_utils;
