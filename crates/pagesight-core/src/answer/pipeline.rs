use super::keywords::{extract_keywords, strip_keywords};
use super::prompt::compose_query;
use super::traits::{AnswerGenerator, TokenStream};
use super::types::{Answer, ContextPage, ConversationTurn};
use crate::config::DEFAULT_CONTEXT_PAGES;
use crate::error::RetrievalError;
use crate::highlight::HighlightResult;
use crate::index::SearchTarget;
use crate::retrieval::{RetrievedPage, Retriever};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument};

/// Retrieval-augmented answering over a [`Retriever`].
///
/// For each conversation:
///
/// 1. The history is condensed into one query ([`compose_query`])
/// 2. The best pages of the target are retrieved for that query
/// 3. The answer service answers from those page images
/// 4. The answer's keywords are highlighted on the pages
pub struct RagPipeline {
    retriever: Arc<Retriever>,
    generator: Arc<dyn AnswerGenerator>,
    context_pages: usize,
}

/// A streamed answer: the context is resolved up front, the text arrives
/// through `tokens`.
pub struct AnswerStream {
    /// Composed query used for retrieval
    pub query: String,
    /// Pages given to the answer service, best first
    pub pages: Vec<RetrievedPage>,
    /// Answer text in arrival order; an `Err` item ends the stream
    pub tokens: TokenStream,
}

impl RagPipeline {
    /// Creates a pipeline sending the best `DEFAULT_CONTEXT_PAGES` pages
    /// to `generator`.
    pub fn new(retriever: Arc<Retriever>, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            retriever,
            generator,
            context_pages: DEFAULT_CONTEXT_PAGES,
        }
    }

    /// Sets how many retrieved pages are sent as context.
    pub fn with_context_pages(mut self, context_pages: usize) -> Self {
        self.context_pages = context_pages;
        self
    }

    /// Retriever used for context pages and keyword OCR.
    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    async fn prepare(
        &self,
        history: &[ConversationTurn],
        target: &SearchTarget,
    ) -> Result<(String, Vec<RetrievedPage>), RetrievalError> {
        let query = compose_query(history, self.generator.as_ref()).await?;
        let pages = self
            .retriever
            .retrieve(&query, target, self.context_pages)
            .await?;
        Ok((query, pages))
    }

    /// Answers the latest message of `history` from the pages of `target`.
    ///
    /// An empty target is not an error: the service is asked without context
    /// and `document_used` is `None`.
    ///
    /// # Errors
    ///
    /// Any retrieval error, or `RetrievalError::AnswerGeneration` when the
    /// answer service fails.
    #[instrument(skip_all, fields(turns = history.len()))]
    pub async fn answer(
        &self,
        history: &[ConversationTurn],
        target: &SearchTarget,
    ) -> Result<Answer, RetrievalError> {
        let (query, pages) = self.prepare(history, target).await?;
        let context: Vec<ContextPage> = pages.iter().map(ContextPage::from).collect();

        let raw = crate::time_operation!(
            record_answer_generation,
            self.generator.generate(&query, &context).await
        )?;

        let keywords = extract_keywords(&raw);
        let text = strip_keywords(&raw);
        let keyword_highlights = self.highlight_keywords(&pages, &keywords).await;
        info!(
            "Answered from {} pages with {} keywords via {}",
            pages.len(),
            keywords.len(),
            self.generator.name()
        );

        Ok(Answer {
            text,
            keywords,
            document_used: pages.first().map(|p| p.page.document_id),
            page_used: pages.first().map(|p| p.page.page_number),
            keyword_highlights,
            pages,
        })
    }

    /// Like [`answer`](Self::answer), streaming the raw answer text.
    ///
    /// The keyword section arrives as part of the stream; callers can run
    /// [`extract_keywords`] on the joined text.
    pub async fn answer_stream(
        &self,
        history: &[ConversationTurn],
        target: &SearchTarget,
    ) -> Result<AnswerStream, RetrievalError> {
        let (query, pages) = self.prepare(history, target).await?;
        let context: Vec<ContextPage> = pages.iter().map(ContextPage::from).collect();
        let tokens = self.generator.generate_stream(&query, &context).await?;
        Ok(AnswerStream {
            query,
            pages,
            tokens,
        })
    }

    /// Keyword overlays for `pages`, in order. Empty without keywords.
    pub async fn highlight_keywords(
        &self,
        pages: &[RetrievedPage],
        keywords: &[String],
    ) -> Vec<HighlightResult> {
        if keywords.is_empty() {
            return Vec::new();
        }
        let composer = self.retriever.composer();
        join_all(pages.iter().map(|page| {
            composer.highlight_keywords(
                (page.index_id, page.page.document_id, page.page.page_number),
                &page.page_image,
                keywords,
            )
        }))
        .await
    }
}
