//! Command implementations.
//!
//! Each run builds the primary index from the corpus directory, then serves
//! one command against it.

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use pagesight_core::answer::{
    extract_keywords, ConversationTurn, OpenAiAnswerGenerator, RagPipeline,
};
use pagesight_core::config::RetrievalConfig;
use pagesight_core::embedding::{HttpEmbedderConfig, HttpPageEmbedder, PageEmbedder};
use pagesight_core::gateway::SerialGateway;
use pagesight_core::index::{
    load_corpus_dir, load_page_images, CorpusBuilder, DocumentId, IndexRegistry, SearchTarget,
    SessionId,
};
use pagesight_core::ocr::TesseractOcr;
use pagesight_core::retrieval::{RetrievedPage, Retriever};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Session used for `ask --upload`.
const CLI_SESSION: &str = "cli";

/// Starts the embedding gateway and indexes the corpus.
///
/// This function:
/// 1. Starts the gateway thread, connecting it to the model server
/// 2. Loads every document under `corpus_dir`
/// 3. Embeds all pages into the primary index
/// 4. Wires the retriever with Tesseract for highlight refinement
pub async fn bootstrap(corpus_dir: &Path, embedder_url: String) -> Result<Arc<Retriever>> {
    let config = RetrievalConfig::default();
    let gateway = Arc::new(start_gateway(embedder_url, &config).await?);

    if !corpus_dir.exists() {
        return Err(anyhow!(
            "No corpus found at {}.\n\
             Put page images there (one sub-directory per document) or pass --corpus-dir.",
            corpus_dir.display()
        ));
    }
    let documents = load_corpus_dir(corpus_dir)
        .with_context(|| format!("Failed to load corpus: {}", corpus_dir.display()))?;
    info!("Indexing {} documents", documents.len());

    let primary = CorpusBuilder::new(gateway.clone())
        .build_corpus(documents, |progress| {
            if let Some(name) = &progress.current_document {
                info!(
                    "Indexing '{}' ({}/{} documents, {:.0}%)",
                    name,
                    progress.documents_completed,
                    progress.documents_total,
                    progress.percent_complete()
                );
            }
        })
        .await
        .context("Failed to index corpus")?;
    info!(
        "Indexed {} pages of {} documents",
        primary.page_count(),
        primary.document_count()
    );

    let retriever = Retriever::new(
        gateway,
        Arc::new(IndexRegistry::new(Arc::new(primary))),
        Some(Arc::new(TesseractOcr::default())),
        config,
    )?;
    Ok(Arc::new(retriever))
}

/// Starts the gateway thread with the HTTP embedder, applying the
/// admission deadline from `config`.
pub async fn start_gateway(
    embedder_url: String,
    config: &RetrievalConfig,
) -> Result<SerialGateway> {
    info!("Connecting to embedding server at {}", embedder_url);
    SerialGateway::start(
        move || {
            let embedder = HttpPageEmbedder::new(HttpEmbedderConfig::new(embedder_url))?;
            Ok(Box::new(embedder) as Box<dyn PageEmbedder>)
        },
        config.admission_timeout(),
    )
    .await
    .context("Failed to start embedding gateway")
}

/// Runs `search` and optionally writes highlight overlays.
pub async fn execute_search(
    retriever: &Retriever,
    query: &str,
    k: usize,
    document: Option<u64>,
    highlights_dir: Option<&PathBuf>,
) -> Result<Vec<RetrievedPage>> {
    let target = match document {
        Some(id) => SearchTarget::Document(DocumentId::from_u64(id)),
        None => SearchTarget::Primary,
    };
    let results = retriever
        .retrieve(query, &target, k)
        .await
        .context("Search failed")?;

    if let Some(dir) = highlights_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for (i, result) in results.iter().enumerate() {
            let path = dir.join(overlay_filename(i, result));
            result
                .highlight
                .overlay
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
    }
    Ok(results)
}

/// `<rank>-doc<id>-page<n>.png`, rank starting at 1.
pub fn overlay_filename(rank: usize, result: &RetrievedPage) -> String {
    format!(
        "{}-doc{}-page{}.png",
        rank + 1,
        result.page.document_id,
        result.page.page_number
    )
}

/// Runs `ask`, streaming the answer to stdout.
///
/// With `upload`, the directory's page images are indexed as this run's
/// session document and the question is asked against it alone.
pub async fn execute_ask(
    retriever: Arc<Retriever>,
    question: &str,
    upload: Option<&PathBuf>,
) -> Result<()> {
    let generator = OpenAiAnswerGenerator::new(crate::config::answer_config()?)?;

    let target = match upload {
        Some(dir) => {
            let pages = load_page_images(dir)
                .with_context(|| format!("Failed to load upload: {}", dir.display()))?;
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let session = SessionId::new(CLI_SESSION);
            retriever
                .upload(session.clone(), &name, pages)
                .await
                .context("Failed to index upload")?;
            SearchTarget::Session(session)
        }
        None => SearchTarget::Primary,
    };

    let pipeline = RagPipeline::new(retriever, Arc::new(generator));
    let mut answer = pipeline
        .answer_stream(&[ConversationTurn::user(question)], &target)
        .await
        .context("Failed to start answer")?;

    let mut stdout = std::io::stdout();
    let mut text = String::new();
    while let Some(token) = answer.tokens.next().await {
        let token = token.context("Answer stream failed")?;
        write!(stdout, "{}", token)?;
        stdout.flush()?;
        text.push_str(&token);
    }
    writeln!(stdout)?;

    let keywords = extract_keywords(&text);
    let highlights = pipeline.highlight_keywords(&answer.pages, &keywords).await;
    if let Some(best) = answer.pages.first() {
        println!(
            "\nSource: {} (page {}){}",
            best.document_name,
            best.page.page_number + 1,
            if highlights.iter().any(|h| !h.regions.is_empty()) {
                ", keywords found on page"
            } else {
                ""
            }
        );
    }
    Ok(())
}
