//! Embedding model abstraction.
//!
//! The vision-language model itself is an external collaborator. This module
//! defines what the rest of the crate needs from it:
//!
//! - [`PageEmbedder`] - page image / query text to multi-vector embedding
//! - [`MultiVector`] - row-major sequence of fixed-dimension vectors
//! - [`PatchGrid`] - the page-to-grid mapping fixed when a page is embedded
//! - [`HttpPageEmbedder`] - blocking JSON client for a model server
//!
//! Embedders are only ever called from the gateway worker thread, see
//! [`crate::gateway`].

mod traits;

pub mod remote;
pub mod types;

pub use remote::{HttpEmbedderConfig, HttpPageEmbedder};
pub use traits::PageEmbedder;
pub use types::{MultiVector, PageEmbedding, PatchGrid};
