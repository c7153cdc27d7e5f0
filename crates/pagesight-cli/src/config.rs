//! Configuration and path resolution for the CLI.
//!
//! Every setting resolves in the same order:
//! 1. Command-line flag
//! 2. Environment variable
//! 3. Platform default (data directory, local model server)

use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use pagesight_core::answer::OpenAiConfig;
use std::path::PathBuf;

/// Environment variable for the corpus directory
pub const CORPUS_DIR_ENV: &str = "PAGESIGHT_CORPUS_DIR";

/// Environment variable for the embedding model server
pub const EMBEDDER_URL_ENV: &str = "PAGESIGHT_EMBEDDER_URL";

/// Environment variable for the answer service key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the answer service endpoint
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Environment variable overriding the answer model
pub const MODEL_ENV: &str = "PAGESIGHT_ANSWER_MODEL";

/// Model server used when nothing else is configured
pub const DEFAULT_EMBEDDER_URL: &str = "http://localhost:8001";

/// Corpus sub-directory of the data directory
const CORPUS_DIRNAME: &str = "corpus";

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Returns the data directory.
///
/// - macOS: `~/Library/Application Support/dev.pagesight.Pagesight/`
/// - Linux: `~/.local/share/pagesight/`
/// - Windows: `%APPDATA%\pagesight\Pagesight\data\`
pub fn data_dir() -> Result<PathBuf> {
    ProjectDirs::from("dev", "pagesight", "Pagesight")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

/// Resolves the directory holding the primary corpus.
pub fn corpus_dir(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = custom_dir {
        return Ok(dir.clone());
    }
    if let Some(dir) = env_var(CORPUS_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    Ok(data_dir()?.join(CORPUS_DIRNAME))
}

/// Resolves the embedding model server URL.
pub fn embedder_url(custom_url: Option<&str>) -> String {
    custom_url
        .map(str::to_string)
        .or_else(|| env_var(EMBEDDER_URL_ENV))
        .unwrap_or_else(|| DEFAULT_EMBEDDER_URL.to_string())
}

/// Builds the answer service configuration from the environment.
pub fn answer_config() -> Result<OpenAiConfig> {
    let api_key = env_var(API_KEY_ENV).ok_or_else(|| {
        anyhow!(
            "No answer service key configured. Set ${} to use `ask`.",
            API_KEY_ENV
        )
    })?;
    let mut config = OpenAiConfig::new(api_key);
    if let Some(base_url) = env_var(BASE_URL_ENV) {
        config.base_url = base_url;
    }
    if let Some(model) = env_var(MODEL_ENV) {
        config.model = model;
    }
    Ok(config)
}
