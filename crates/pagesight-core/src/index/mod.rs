//! Page indexes.
//!
//! A [`CorpusIndex`] is an immutable set of embedded documents. The
//! [`IndexRegistry`] owns the primary corpus (built once at startup) and the
//! per-session ephemeral indexes created by uploads; [`CorpusBuilder`] produces
//! both by embedding pages through the gateway.

pub mod builder;
pub mod corpus;
pub mod loader;
pub mod progress;
pub mod registry;
pub mod types;

pub use builder::{CorpusBuilder, SourceDocument};
pub use corpus::CorpusIndex;
pub use loader::{load_corpus_dir, load_page_images, CorpusLoadError};
pub use progress::{CorpusProgress, IndexingProgress};
pub use registry::{IndexRegistry, ResolvedTarget, UploadOutcome, UPLOAD_DOCUMENT_ID};
pub use types::{DocumentId, DocumentPages, IndexId, PageRecord, SearchTarget, SessionId};
