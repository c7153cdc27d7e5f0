//! Pagesight CLI - visual retrieval over a directory of page images.
//!
//! # Usage
//!
//! ```bash
//! # Rank pages of the corpus
//! pagesight search "quarterly revenue"
//! pagesight search "net income" -k 5 --highlights out/
//! pagesight search "query" --document 2 --json
//!
//! # Answer a question from the best pages (needs OPENAI_API_KEY)
//! pagesight ask what was the net income in 2023
//! pagesight ask summarize this contract --upload scans/contract/
//! ```

mod app;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pagesight_core::config::DEFAULT_TOP_K;
use pagesight_core::metrics::global_metrics;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Pagesight visual page retrieval CLI.
///
/// Indexes rendered document pages with a late-interaction vision model and
/// finds the pages, and the regions on them, that answer a query.
#[derive(Parser)]
#[command(name = "pagesight", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Corpus directory (default: $PAGESIGHT_CORPUS_DIR, then the platform data directory)
    #[arg(long, global = true)]
    corpus_dir: Option<PathBuf>,

    /// Embedding model server (default: $PAGESIGHT_EMBEDDER_URL, then http://localhost:8001)
    #[arg(long, global = true)]
    embedder_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print timing statistics to stderr when done
    #[arg(long, global = true)]
    stats: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Rank corpus pages for a query
    Search {
        /// Search query
        query: String,

        /// Number of pages to return
        #[arg(short = 'k', long = "top-k", default_value_t = DEFAULT_TOP_K)]
        k: usize,

        /// Only search this document
        #[arg(long)]
        document: Option<u64>,

        /// Write highlighted page images to this directory
        #[arg(long)]
        highlights: Option<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Answer a question from the best pages
    Ask {
        /// Question words
        #[arg(required = true)]
        question: Vec<String>,

        /// Index this directory of page images and ask about it instead
        #[arg(long)]
        upload: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let corpus_dir = config::corpus_dir(cli.corpus_dir.as_ref())?;
    let embedder_url = config::embedder_url(cli.embedder_url.as_deref());
    let retriever = app::bootstrap(&corpus_dir, embedder_url).await?;

    match &cli.command {
        Command::Search {
            query,
            k,
            document,
            highlights,
            json,
        } => {
            let results =
                app::execute_search(&retriever, query, *k, *document, highlights.as_ref()).await?;
            let output = if *json {
                output::format_json(query, &results)
            } else {
                output::format_human(query, &results)
            };
            println!("{}", output);
        }
        Command::Ask { question, upload } => {
            app::execute_ask(retriever, &question.join(" "), upload.as_ref()).await?;
        }
    }

    if cli.stats {
        global_metrics().prune();
        eprintln!("{}", output::format_stats(&global_metrics().snapshot()));
    }

    Ok(())
}
