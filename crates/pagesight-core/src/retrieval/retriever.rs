use super::types::RetrievedPage;
use crate::config::RetrievalConfig;
use crate::error::RetrievalError;
use crate::gateway::EmbeddingGateway;
use crate::highlight::HighlightComposer;
use crate::index::{
    CorpusBuilder, CorpusIndex, IndexRegistry, PageRecord, SearchTarget, SessionId,
};
use crate::metrics::{global_metrics, RetrievalTimings};
use crate::ocr::{OcrCache, OcrEngine};
use crate::search::{score_pages, top_k, ScoredPage};
use futures::future::join_all;
use image::RgbImage;
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Visual page retrieval over the primary corpus and session uploads.
pub struct Retriever {
    gateway: Arc<dyn EmbeddingGateway>,
    registry: Arc<IndexRegistry>,
    builder: CorpusBuilder,
    composer: HighlightComposer,
    config: RetrievalConfig,
}

impl Retriever {
    /// Creates a retriever.
    ///
    /// Pass `None` for `ocr` to outline raw patch rectangles only.
    ///
    /// # Errors
    ///
    /// `RetrievalError::InvalidConfig` if `config` fails validation.
    pub fn new(
        gateway: Arc<dyn EmbeddingGateway>,
        registry: Arc<IndexRegistry>,
        ocr: Option<Arc<dyn OcrEngine>>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        config.validate()?;
        let composer = HighlightComposer::new(ocr, Arc::new(OcrCache::new()), &config);
        Ok(Self {
            builder: CorpusBuilder::new(gateway.clone()),
            gateway,
            registry,
            composer,
            config,
        })
    }

    /// Index registry this retriever reads from.
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Gateway used for query and upload embeddings.
    pub fn gateway(&self) -> &Arc<dyn EmbeddingGateway> {
        &self.gateway
    }

    /// Highlight composer (shared with the answer pipeline).
    pub fn composer(&self) -> &HighlightComposer {
        &self.composer
    }

    /// Active configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Returns the `k` best pages of `target` for `query`, each with its
    /// highlight, in ranking order.
    ///
    /// A query that matches nothing is not an error; an empty target yields
    /// an empty vector.
    ///
    /// # Errors
    ///
    /// - `RetrievalError::InvalidQuery` for a blank query (the gateway is not
    ///   touched) or one that embeds to zero tokens
    /// - `RetrievalError::DocumentNotFound` / `SessionHasNoIndex` if the
    ///   target cannot be resolved
    /// - `RetrievalError::ResourceTimeout` if the query waited too long for
    ///   the embedding model
    /// - `RetrievalError::Embedding` / `DimensionMismatch` on model failures
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn retrieve(
        &self,
        query: &str,
        target: &SearchTarget,
        k: usize,
    ) -> Result<Vec<RetrievedPage>, RetrievalError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::InvalidQuery("query is empty".to_string()));
        }

        // Snapshot the index before embedding: a concurrent upload replacing
        // the session index does not affect this query.
        let resolved = self.registry.resolve(target)?;
        let index = resolved.index;

        let embed_start = Instant::now();
        let query_vectors = self.gateway.embed_query(query).await?;
        let query_embed_ms = embed_start.elapsed().as_secs_f64() * 1000.0;
        if query_vectors.is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "query produced no token embeddings".to_string(),
            ));
        }
        debug!(
            "Query embedded to {} tokens in {:.1}ms",
            query_vectors.rows(),
            query_embed_ms
        );

        let scoring_start = Instant::now();
        let pages: Vec<&PageRecord> = match resolved.document {
            Some(document_id) => index.lookup(document_id)?.pages().iter().collect(),
            None => index.pages().collect(),
        };
        let pages_scored = pages.len();
        let selected = top_k(score_pages(&query_vectors, pages)?, k);
        let scoring_ms = scoring_start.elapsed().as_secs_f64() * 1000.0;

        let highlight_start = Instant::now();
        let results = join_all(
            selected
                .into_iter()
                .map(|scored| self.highlight(&index, scored)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
        let highlight_ms = highlight_start.elapsed().as_secs_f64() * 1000.0;

        let timings = RetrievalTimings {
            query_embed_ms,
            scoring_ms,
            highlight_ms,
            result_count: results.len(),
            pages_scored,
            top_score: results.first().map(|r| r.page.score),
            ocr_degraded_count: results.iter().filter(|r| r.highlight.ocr_degraded).count(),
        };
        global_metrics().record_retrieval(&timings);
        info!(
            "Retrieved {} of {} pages in {:.1}ms (embed {:.1}ms, score {:.1}ms, highlight {:.1}ms)",
            timings.result_count,
            pages_scored,
            query_embed_ms + scoring_ms + highlight_ms,
            query_embed_ms,
            scoring_ms,
            highlight_ms
        );

        Ok(results)
    }

    /// [`retrieve`](Self::retrieve) with the configured `top_k`.
    pub async fn retrieve_default(
        &self,
        query: &str,
        target: &SearchTarget,
    ) -> Result<Vec<RetrievedPage>, RetrievalError> {
        self.retrieve(query, target, self.config.top_k).await
    }

    async fn highlight(
        &self,
        index: &CorpusIndex,
        scored: ScoredPage,
    ) -> Result<RetrievedPage, RetrievalError> {
        let document = index.lookup(scored.document_id)?;
        let page = document
            .page(scored.page_number)
            .ok_or(RetrievalError::DocumentNotFound(scored.document_id))?;
        let highlight = self.composer.compose(index.id(), page, &scored).await;
        Ok(RetrievedPage {
            document_name: document.name().to_string(),
            page_image: page.image().clone(),
            index_id: index.id(),
            page: scored,
            highlight,
        })
    }

    /// Indexes an uploaded document and makes it the session's search
    /// target, replacing any previous upload.
    ///
    /// On failure the session's previous index stays in place. If the
    /// session ends, or a newer upload starts, before the build finishes,
    /// the built index is dropped and `SessionEnded` / `UploadSuperseded`
    /// is returned.
    pub async fn upload(
        &self,
        session: SessionId,
        name: &str,
        pages: Vec<Arc<RgbImage>>,
    ) -> Result<Arc<CorpusIndex>, RetrievalError> {
        let outcome = self
            .registry
            .upload(&self.builder, session, name, pages)
            .await?;
        if let Some(replaced) = outcome.replaced {
            let evicted = self.composer.cache().evict_index(replaced.id());
            debug!("Evicted {} OCR entries of replaced upload", evicted);
        }
        Ok(outcome.index)
    }

    /// Ends a session, releasing its ephemeral index and OCR entries.
    ///
    /// Returns false if the session had no index.
    pub fn end_session(&self, session: &SessionId) -> bool {
        match self.registry.end_session(session) {
            Some(index) => {
                self.composer.cache().evict_index(index.id());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DocumentId, SourceDocument};
    use crate::test_utils::{solid_page, AsyncGate, FakeOcr, StaticGateway};

    async fn retriever_with(gateway: Arc<StaticGateway>, colors: &[&[[u8; 3]]]) -> Retriever {
        let documents = colors
            .iter()
            .enumerate()
            .map(|(i, pages)| SourceDocument {
                id: DocumentId::from_u64(i as u64),
                name: format!("doc-{}", i),
                pages: pages
                    .iter()
                    .map(|c| Arc::new(solid_page(8, 8, *c)))
                    .collect(),
            })
            .collect();
        let primary = CorpusBuilder::new(gateway.clone())
            .build_corpus(documents, |_| {})
            .await
            .unwrap();
        Retriever::new(
            gateway,
            Arc::new(IndexRegistry::new(Arc::new(primary))),
            Some(Arc::new(FakeOcr::new(Vec::new()))),
            RetrievalConfig::default(),
        )
        .unwrap()
    }

    fn keys(results: &[RetrievedPage]) -> Vec<(u64, u32)> {
        results
            .iter()
            .map(|r| (r.page.document_id.as_u64(), r.page.page_number))
            .collect()
    }

    #[tokio::test]
    async fn test_blank_query_never_reaches_gateway() {
        let gateway = Arc::new(StaticGateway::new());
        let retriever = retriever_with(gateway.clone(), &[&[[255, 0, 0]]]).await;

        let result = retriever.retrieve("   \n", &SearchTarget::Primary, 2).await;
        assert!(matches!(result, Err(RetrievalError::InvalidQuery(_))));
        assert_eq!(gateway.query_calls(), 0);
    }

    #[tokio::test]
    async fn test_ranks_pages_by_colour_match() {
        let gateway = Arc::new(StaticGateway::new());
        let retriever = retriever_with(
            gateway,
            &[&[[255, 0, 0], [0, 255, 0]], &[[0, 0, 255], [255, 0, 0]]],
        )
        .await;

        // Red query: both red pages tie, document order breaks the tie
        let results = retriever
            .retrieve("1,0,0", &SearchTarget::Primary, 3)
            .await
            .unwrap();
        assert_eq!(keys(&results)[..2], [(0, 0), (1, 1)]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].document_name, "doc-0");
        assert!(!results[0].highlight.ocr_degraded);
    }

    #[tokio::test]
    async fn test_document_target_restricts_pages() {
        let gateway = Arc::new(StaticGateway::new());
        let retriever = retriever_with(
            gateway,
            &[&[[255, 0, 0]], &[[0, 255, 0], [0, 0, 255]]],
        )
        .await;

        let results = retriever
            .retrieve(
                "1,0,0",
                &SearchTarget::Document(DocumentId::from_u64(1)),
                5,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.page.document_id.as_u64() == 1));

        let missing = retriever
            .retrieve("1,0,0", &SearchTarget::Document(DocumentId::from_u64(7)), 5)
            .await;
        assert!(matches!(missing, Err(RetrievalError::DocumentNotFound(_))));
    }

    #[tokio::test]
    async fn test_k_zero_and_zero_token_query() {
        let gateway = Arc::new(StaticGateway::new());
        let retriever = retriever_with(gateway, &[&[[255, 0, 0]]]).await;

        let results = retriever
            .retrieve("1,0,0", &SearchTarget::Primary, 0)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_session_upload_and_end() {
        let gateway = Arc::new(StaticGateway::new());
        let retriever = retriever_with(gateway, &[&[[255, 0, 0]]]).await;
        let session = SessionId::new("alice");
        let target = SearchTarget::Session(session.clone());

        assert!(matches!(
            retriever.retrieve("0,1,0", &target, 2).await,
            Err(RetrievalError::SessionHasNoIndex(_))
        ));

        retriever
            .upload(
                session.clone(),
                "upload",
                vec![
                    Arc::new(solid_page(8, 8, [0, 0, 255])),
                    Arc::new(solid_page(8, 8, [0, 255, 0])),
                ],
            )
            .await
            .unwrap();

        let results = retriever.retrieve_default("0,1,0", &target).await.unwrap();
        assert_eq!(keys(&results), vec![(0, 1), (0, 0)]);
        assert_eq!(results[0].document_name, "upload");

        assert!(retriever.end_session(&session));
        assert!(!retriever.end_session(&session));
        assert!(retriever.composer().cache().is_empty());
    }

    #[tokio::test]
    async fn test_query_on_released_index_leaves_no_ocr_entries() {
        let gate = Arc::new(AsyncGate::new());
        let retriever = Retriever::new(
            Arc::new(StaticGateway::new()),
            Arc::new(IndexRegistry::new(Arc::new(CorpusIndex::empty()))),
            Some(Arc::new(FakeOcr::new(Vec::new()).with_gate(gate.clone()))),
            RetrievalConfig::default(),
        )
        .unwrap();
        let session = SessionId::new("carol");
        let target = SearchTarget::Session(session.clone());
        let first = retriever
            .upload(session.clone(), "a", vec![Arc::new(solid_page(8, 8, [255, 0, 0]))])
            .await
            .unwrap();

        // Replace and end the session while the query is inside OCR
        let (results, ()) = tokio::join!(retriever.retrieve("1,0,0", &target, 1), async {
            gate.wait_entered().await;
            retriever
                .upload(session.clone(), "b", vec![Arc::new(solid_page(8, 8, [0, 255, 0]))])
                .await
                .unwrap();
            assert!(retriever.end_session(&session));
            gate.release();
        });

        let results = results.unwrap();
        assert_eq!(results[0].index_id, first.id());
        assert_eq!(results[0].document_name, "a");
        assert!(retriever.composer().cache().is_empty());
    }
}
