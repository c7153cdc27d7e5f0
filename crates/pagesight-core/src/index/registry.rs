//! Primary corpus plus per-session ephemeral indexes.

use super::builder::CorpusBuilder;
use super::corpus::CorpusIndex;
use super::types::{DocumentId, SearchTarget, SessionId};
use crate::error::RetrievalError;
use image::RgbImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, instrument};

/// Document id given to a session's uploaded document.
pub const UPLOAD_DOCUMENT_ID: DocumentId = DocumentId::from_u64(0);

/// An index snapshot plus an optional single-document restriction.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// Index to score against
    pub index: Arc<CorpusIndex>,
    /// Only score this document, if set
    pub document: Option<DocumentId>,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// The newly installed index
    pub index: Arc<CorpusIndex>,
    /// The index it replaced, if the session had one
    pub replaced: Option<Arc<CorpusIndex>>,
}

/// A live session: its installed index and the upload allowed to replace it.
struct SessionSlot {
    /// Ticket of the most recently started upload
    latest_upload: u64,
    index: Option<Arc<CorpusIndex>>,
}

/// Owner of every index the process serves.
///
/// The primary index is built once at startup and never changes. Each
/// session holds at most one ephemeral index, replaced wholesale by the next
/// upload. Readers take an `Arc` snapshot and never block a replacement; a
/// query that resolved the old index finishes against it.
///
/// Every upload takes a ticket when it starts. When its build finishes it
/// installs only if the session is still alive and no later upload has
/// started; otherwise the built index is dropped.
pub struct IndexRegistry {
    primary: Arc<CorpusIndex>,
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
    next_ticket: AtomicU64,
}

impl IndexRegistry {
    /// Creates a registry around the primary corpus.
    pub fn new(primary: Arc<CorpusIndex>) -> Self {
        Self {
            primary,
            sessions: RwLock::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// The primary corpus index.
    pub fn primary(&self) -> Arc<CorpusIndex> {
        self.primary.clone()
    }

    /// The current ephemeral index of a session, if any.
    pub fn session(&self, session: &SessionId) -> Option<Arc<CorpusIndex>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .and_then(|slot| slot.index.clone())
    }

    /// Installs `index` as the session's ephemeral index.
    ///
    /// The swap is atomic: concurrent readers see either the previous index
    /// or the new one, never a mix. Returns the replaced index, which stays
    /// alive until its last reader drops it.
    pub fn replace_ephemeral(
        &self,
        session: SessionId,
        index: Arc<CorpusIndex>,
    ) -> Option<Arc<CorpusIndex>> {
        debug!("Installing index {:?} for session {}", index.id(), session);
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let slot = sessions.entry(session).or_insert(SessionSlot {
            latest_upload: ticket,
            index: None,
        });
        slot.latest_upload = ticket;
        slot.index.replace(index)
    }

    /// Ends a session: drops its ephemeral index and invalidates any upload
    /// still being built for it. Returns the index if there was one.
    pub fn end_session(&self, session: &SessionId) -> Option<Arc<CorpusIndex>> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session)?;
        info!("Session {} ended; ephemeral index released", session);
        removed.index
    }

    /// Number of sessions holding an ephemeral index.
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.index.is_some())
            .count()
    }

    /// Registers a starting upload and returns its ticket.
    fn begin_upload(&self, session: &SessionId) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(session.clone())
            .and_modify(|slot| slot.latest_upload = ticket)
            .or_insert(SessionSlot {
                latest_upload: ticket,
                index: None,
            });
        ticket
    }

    /// Resolves a search target to an index snapshot.
    ///
    /// # Errors
    ///
    /// - `RetrievalError::DocumentNotFound` if a document target is not in the primary corpus
    /// - `RetrievalError::SessionHasNoIndex` if the session never uploaded (or has ended)
    pub fn resolve(&self, target: &SearchTarget) -> Result<ResolvedTarget, RetrievalError> {
        match target {
            SearchTarget::Primary => Ok(ResolvedTarget {
                index: self.primary(),
                document: None,
            }),
            SearchTarget::Document(document_id) => {
                self.primary.lookup(*document_id)?;
                Ok(ResolvedTarget {
                    index: self.primary(),
                    document: Some(*document_id),
                })
            }
            SearchTarget::Session(session) => self
                .session(session)
                .map(|index| ResolvedTarget {
                    index,
                    document: None,
                })
                .ok_or_else(|| RetrievalError::SessionHasNoIndex(session.clone())),
        }
    }

    /// Builds an index for an uploaded document and installs it for the
    /// session.
    ///
    /// On failure the session keeps whatever index it had before.
    ///
    /// # Errors
    ///
    /// - `RetrievalError::IndexingFailed` / `Embedding` if the build fails
    /// - `RetrievalError::SessionEnded` if the session ended during the build
    /// - `RetrievalError::UploadSuperseded` if a later upload for the session
    ///   started during the build
    #[instrument(skip_all, fields(session = %session, pages = pages.len()))]
    pub async fn upload(
        &self,
        builder: &CorpusBuilder,
        session: SessionId,
        name: &str,
        pages: Vec<Arc<RgbImage>>,
    ) -> Result<UploadOutcome, RetrievalError> {
        let ticket = self.begin_upload(&session);
        let built = builder.build(UPLOAD_DOCUMENT_ID, name, pages).await;

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let index = match built {
            Ok(index) => Arc::new(index),
            Err(e) => {
                let abandoned = sessions
                    .get(&session)
                    .is_some_and(|slot| slot.latest_upload == ticket && slot.index.is_none());
                if abandoned {
                    sessions.remove(&session);
                }
                return Err(e);
            }
        };

        match sessions.get_mut(&session) {
            Some(slot) if slot.latest_upload == ticket => {
                debug!("Installing index {:?} for session {}", index.id(), session);
                let replaced = slot.index.replace(index.clone());
                Ok(UploadOutcome { index, replaced })
            }
            Some(_) => {
                debug!("Discarding superseded upload for session {}", session);
                Err(RetrievalError::UploadSuperseded(session))
            }
            None => {
                info!("Session {} ended during upload; index discarded", session);
                Err(RetrievalError::SessionEnded(session))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{solid_page, AsyncGate, StaticGateway};

    fn registry() -> IndexRegistry {
        IndexRegistry::new(Arc::new(CorpusIndex::empty()))
    }

    #[test]
    fn test_resolve_session_without_upload() {
        let registry = registry();
        let session = SessionId::new("s1");
        assert!(matches!(
            registry.resolve(&SearchTarget::Session(session)),
            Err(RetrievalError::SessionHasNoIndex(_))
        ));
    }

    #[test]
    fn test_resolve_unknown_document() {
        let registry = registry();
        assert!(matches!(
            registry.resolve(&SearchTarget::Document(DocumentId::from_u64(5))),
            Err(RetrievalError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_replace_keeps_old_snapshot_alive() {
        let registry = registry();
        let session = SessionId::new("s1");
        let first = Arc::new(CorpusIndex::empty());
        let second = Arc::new(CorpusIndex::empty());

        assert!(registry
            .replace_ephemeral(session.clone(), first.clone())
            .is_none());
        let snapshot = registry.session(&session).unwrap();

        let previous = registry
            .replace_ephemeral(session.clone(), second.clone())
            .unwrap();
        assert_eq!(previous.id(), first.id());
        assert_eq!(snapshot.id(), first.id());
        assert_eq!(registry.session(&session).unwrap().id(), second.id());
    }

    #[test]
    fn test_end_session() {
        let registry = registry();
        let session = SessionId::new("s1");
        registry.replace_ephemeral(session.clone(), Arc::new(CorpusIndex::empty()));
        assert_eq!(registry.session_count(), 1);
        assert!(registry.end_session(&session).is_some());
        assert!(registry.end_session(&session).is_none());
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_previous_index() {
        let registry = registry();
        let builder = CorpusBuilder::new(Arc::new(StaticGateway::new().fail_pages_with_red(9)));
        let session = SessionId::new("s1");

        let good = registry
            .upload(
                &builder,
                session.clone(),
                "good",
                vec![Arc::new(solid_page(8, 8, [1, 2, 3]))],
            )
            .await
            .unwrap()
            .index;

        let bad = registry
            .upload(
                &builder,
                session.clone(),
                "bad",
                vec![Arc::new(solid_page(8, 8, [9, 0, 0]))],
            )
            .await;
        assert!(bad.is_err());
        assert_eq!(registry.session(&session).unwrap().id(), good.id());
    }

    #[tokio::test]
    async fn test_session_ended_during_upload_stays_ended() {
        let registry = registry();
        let gate = Arc::new(AsyncGate::new());
        let builder = CorpusBuilder::new(Arc::new(
            StaticGateway::new().with_page_gate(gate.clone()),
        ));
        let session = SessionId::new("s1");

        let (uploaded, ended) = tokio::join!(
            registry.upload(
                &builder,
                session.clone(),
                "late",
                vec![Arc::new(solid_page(8, 8, [1, 2, 3]))],
            ),
            async {
                gate.wait_entered().await;
                let ended = registry.end_session(&session);
                gate.release();
                ended
            }
        );

        assert!(ended.is_none());
        assert!(matches!(uploaded, Err(RetrievalError::SessionEnded(_))));
        assert!(registry.session(&session).is_none());
        assert_eq!(registry.session_count(), 0);
        assert!(registry.end_session(&session).is_none());
    }

    #[tokio::test]
    async fn test_older_upload_does_not_overwrite_newer() {
        let registry = registry();
        let gate = Arc::new(AsyncGate::new());
        let slow = CorpusBuilder::new(Arc::new(
            StaticGateway::new().with_page_gate(gate.clone()),
        ));
        let fast = CorpusBuilder::new(Arc::new(StaticGateway::new()));
        let session = SessionId::new("s1");

        let (older, newer) = tokio::join!(
            registry.upload(
                &slow,
                session.clone(),
                "older",
                vec![Arc::new(solid_page(8, 8, [1, 0, 0]))],
            ),
            async {
                gate.wait_entered().await;
                let newer = registry
                    .upload(
                        &fast,
                        session.clone(),
                        "newer",
                        vec![Arc::new(solid_page(8, 8, [2, 0, 0]))],
                    )
                    .await;
                gate.release();
                newer
            }
        );

        let newer = newer.unwrap().index;
        assert!(matches!(older, Err(RetrievalError::UploadSuperseded(_))));
        assert_eq!(registry.session(&session).unwrap().id(), newer.id());
    }
}
