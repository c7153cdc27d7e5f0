//! Embedding gateway: serialized admission to the embedding accelerator.
//!
//! The accelerator running the vision-language model is memory-bound and not
//! safe to share between concurrent calls, so exactly one embedding
//! computation runs at any instant. Every caller goes through a single
//! admission queue owned by a dedicated worker thread:
//!
//! - **Priority**: query embeddings (`Immediate`) are served before page
//!   embeddings (`Background`) that have not started yet, so a chat query is
//!   not stuck behind a large upload being indexed page by page
//! - **FIFO within a class**: a query never overtakes an earlier query
//! - **Deadlines**: a request still queued when its admission deadline passes
//!   fails with a timeout and is never executed
//! - **Cancellation**: dropping a pending request before it starts removes it;
//!   a started computation runs to completion and its result is discarded
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────────┐
//! │  Async Callers  │────▶│  MPSC Channel   │────▶│  Worker Thread      │
//! │  (tokio tasks)  │     │                 │     │  (owns the model)   │
//! └─────────────────┘     └─────────────────┘     └─────────────────────┘
//!         ▲                                                │
//!         │                oneshot response                ▼
//!         └────────────────────────────────────── ┌───────────────────┐
//!                                                 │  Priority Queue   │
//!                                                 │  P0 queries first │
//!                                                 └───────────────────┘
//! ```

pub mod error;
pub mod scheduler;
pub mod serial_gateway;
pub mod types;

pub use error::GatewayError;
pub use scheduler::EmbeddingGateway;
pub use serial_gateway::{PendingEmbedding, SerialGateway};
pub use types::{EmbedInput, EmbedOutput, GatewayStats, Priority};
