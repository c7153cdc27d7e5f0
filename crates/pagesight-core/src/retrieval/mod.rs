//! Query-time orchestration.
//!
//! [`Retriever::retrieve`] is the single entry point that turns a query into
//! ranked, highlighted pages:
//!
//! ```text
//! query ──▶ resolve target ──▶ embed (gateway, P0) ──▶ MaxSim over every page
//!                                                          │
//!        ranked pages ◀── highlight selected pages ◀── top-k
//! ```
//!
//! The retriever holds no per-query state. Concurrent queries share the
//! gateway queue and the OCR cache and nothing else.

pub mod retriever;
pub mod types;

pub use retriever::Retriever;
pub use types::RetrievedPage;
