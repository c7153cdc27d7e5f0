//! Blocking HTTP client for a late-interaction model server.
//!
//! The server exposes two JSON endpoints:
//!
//! - `POST {base}/embed/page` with `{"image": "<base64 png>"}`, answering
//!   `{"embeddings": [[f32; dim]; patches], "grid": {"columns": c, "rows": r}}`
//! - `POST {base}/embed/query` with `{"text": "..."}`, answering
//!   `{"embeddings": [[f32; dim]; tokens]}`
//!
//! The client is blocking because it runs on the gateway worker thread, which
//! owns the model connection and processes one request at a time.

use super::traits::PageEmbedder;
use super::types::{MultiVector, PageEmbedding, PatchGrid};
use crate::error::EmbeddingError;
use crate::highlight::encode::to_base64_png;
use image::RgbImage;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for [`HttpPageEmbedder`].
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    /// Server base URL, e.g. `http://localhost:8001`
    pub base_url: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Per-request timeout (page embedding can be slow on CPU)
    pub timeout: Duration,
    /// Attempts per request, including the first
    pub max_retries: usize,
}

impl HttpEmbedderConfig {
    /// Creates a config with a 120s timeout and 3 attempts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(120),
            max_retries: 3,
        }
    }
}

/// Page embedder backed by a remote model server.
pub struct HttpPageEmbedder {
    client: Client,
    page_endpoint: String,
    query_endpoint: String,
    max_retries: usize,
}

impl HttpPageEmbedder {
    /// Builds the HTTP client.
    ///
    /// Call this on the gateway worker thread (inside the factory closure):
    /// the blocking client must not be created or dropped inside an async
    /// runtime.
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, EmbeddingError> {
        if config.base_url.trim().is_empty() {
            return Err(EmbeddingError::ModelUnavailable(
                "missing embedding server URL".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let auth = format!("Bearer {}", key.trim());
            let value = HeaderValue::from_str(&auth).map_err(|e| {
                EmbeddingError::ModelUnavailable(format!("invalid API key: {}", e))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::ModelUnavailable(format!("HTTP client: {}", e)))?;

        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            page_endpoint: format!("{}/embed/page", base),
            query_endpoint: format!("{}/embed/query", base),
            max_retries: config.max_retries.max(1),
        })
    }

    fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R, EmbeddingError> {
        let mut attempt = 0usize;
        loop {
            match self.client.post(endpoint).json(body).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<R>().map_err(|e| {
                            EmbeddingError::MalformedOutput(format!("response body: {}", e))
                        });
                    }

                    let text = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!("Embedding server returned {}, retrying ({})", status, attempt);
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    if status.is_client_error() {
                        return Err(EmbeddingError::InvalidInput(format!("{}: {}", status, text)));
                    }
                    return Err(EmbeddingError::InferenceFailed(format!("{}: {}", status, text)));
                }
                Err(err) => {
                    if (err.is_timeout() || err.is_connect()) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!("Embedding server unreachable ({}), retrying ({})", err, attempt);
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(EmbeddingError::InferenceFailed(err.to_string()));
                }
            }
        }
    }
}

impl PageEmbedder for HttpPageEmbedder {
    fn embed_page(&self, image: &RgbImage) -> Result<PageEmbedding, EmbeddingError> {
        let encoded = to_base64_png(image)
            .map_err(|e| EmbeddingError::InvalidInput(format!("PNG encoding: {}", e)))?;
        let response: PageResponse =
            self.post_json(&self.page_endpoint, &PageRequest { image: &encoded })?;
        let patches = MultiVector::from_rows(response.embeddings)?;
        let grid = PatchGrid::new(
            response.grid.columns,
            response.grid.rows,
            image.width(),
            image.height(),
        );
        if grid.len() != patches.rows() {
            return Err(EmbeddingError::MalformedOutput(format!(
                "grid {}x{} does not match {} patch vectors",
                grid.columns,
                grid.rows,
                patches.rows()
            )));
        }
        debug!(
            "Embedded page {}x{} into {} patches of dim {}",
            image.width(),
            image.height(),
            patches.rows(),
            patches.dim()
        );
        Ok(PageEmbedding { patches, grid })
    }

    fn embed_query(&self, text: &str) -> Result<MultiVector, EmbeddingError> {
        let response: QueryResponse =
            self.post_json(&self.query_endpoint, &QueryRequest { text })?;
        MultiVector::from_rows(response.embeddings)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(250 * (1 << capped))
}

#[derive(Serialize)]
struct PageRequest<'a> {
    image: &'a str,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    embeddings: Vec<Vec<f32>>,
    grid: GridShape,
}

#[derive(Debug, Deserialize)]
struct GridShape {
    columns: u32,
    rows: u32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_url() {
        let result = HttpPageEmbedder::new(HttpEmbedderConfig::new("  "));
        assert!(matches!(result, Err(EmbeddingError::ModelUnavailable(_))));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(retry_backoff(1), Duration::from_millis(500));
        assert_eq!(retry_backoff(9), retry_backoff(5));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_page_response_shape() {
        let body = r#"{"embeddings": [[1.0, 0.0], [0.0, 1.0]], "grid": {"columns": 2, "rows": 1}}"#;
        let parsed: PageResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.grid.columns, 2);
        assert_eq!(parsed.embeddings.len(), 2);
    }
}
