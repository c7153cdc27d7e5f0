//! OpenAI-compatible chat-completions client.
//!
//! Context pages are sent as `image_url` parts carrying PNG data URLs.
//! Streaming responses are server-sent events: one `data: {json}` line per
//! chunk, terminated by `data: [DONE]`.

use super::prompt::{
    summarization_prompt, ANSWER_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, SUMMARY_SYSTEM_PROMPT,
};
use super::traits::{AnswerGenerator, TokenStream};
use super::types::{ContextPage, ConversationTurn};
use crate::error::AnswerError;
use crate::highlight::encode::to_data_url;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default multimodal model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Connection and sampling settings for [`OpenAiAnswerGenerator`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// API base URL without the `/chat/completions` suffix
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Config for the public endpoint and default model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Answer generator backed by a chat-completions endpoint.
pub struct OpenAiAnswerGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiAnswerGenerator {
    pub fn new(config: OpenAiConfig) -> Result<Self, AnswerError> {
        if config.api_key.trim().is_empty() {
            return Err(AnswerError::Request("missing API key".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnswerError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.trim().to_string(),
            model: config.model,
            temperature: config.temperature,
        })
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response, AnswerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AnswerError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, AnswerError> {
        let response: ChatResponse = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| AnswerError::MalformedResponse(e.to_string()))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AnswerError::MalformedResponse("response had no content".to_string()))
    }

    fn answer_request(
        &self,
        query: &str,
        context: &[ContextPage],
        stream: bool,
    ) -> Result<ChatRequest<'_>, AnswerError> {
        let mut parts = Vec::with_capacity(context.len() + 1);
        parts.push(ContentPart::Text {
            text: query.to_string(),
        });
        for page in context {
            let url = to_data_url(&page.image).map_err(|e| {
                AnswerError::Request(format!(
                    "failed to encode document {} page {}: {}",
                    page.document_id, page.page_number, e
                ))
            })?;
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            });
        }

        Ok(ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            stream,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(ANSWER_SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(parts),
                },
            ],
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiAnswerGenerator {
    async fn summarize(&self, turns: &[ConversationTurn]) -> Result<String, AnswerError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: DEFAULT_TEMPERATURE,
            stream: false,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SUMMARY_SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Text(summarization_prompt(turns)),
                },
            ],
        };
        self.complete(&request).await
    }

    #[instrument(skip_all, fields(model = %self.model, pages = context.len()))]
    async fn generate(&self, query: &str, context: &[ContextPage]) -> Result<String, AnswerError> {
        let request = self.answer_request(query, context, false)?;
        let answer = self.complete(&request).await?;
        debug!("Answer service returned {} chars", answer.len());
        Ok(answer)
    }

    async fn generate_stream(
        &self,
        query: &str,
        context: &[ContextPage],
    ) -> Result<TokenStream, AnswerError> {
        let request = self.answer_request(query, context, true)?;
        let response = self.send(&request).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| AnswerError::Request(e.to_string()))
            })
            .boxed();
        Ok(sse_tokens(body))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

// =============================================================================
// Server-sent events
// =============================================================================

/// One meaningful line of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Answer text fragment
    Token(String),
    /// End of the answer
    Done,
}

/// Parses one SSE line.
///
/// Returns `None` for blank lines, comments, non-`data` fields and chunks
/// without text (role announcements, finish reasons).
pub fn parse_sse_line(line: &str) -> Result<Option<SseEvent>, AnswerError> {
    let line = line.trim();
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| AnswerError::MalformedResponse(format!("bad stream chunk: {}", e)))?;
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(SseEvent::Token(text)))
    }
}

type ByteStream = BoxStream<'static, Result<Vec<u8>, AnswerError>>;

struct SseState {
    body: ByteStream,
    buffer: Vec<u8>,
    done: bool,
}

impl SseState {
    /// Removes the next complete line from the buffer.
    fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Turns a streamed response body into answer fragments.
///
/// Stops after `[DONE]`, at the end of the body or after the first error.
fn sse_tokens(body: ByteStream) -> TokenStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            let line = match state.next_line() {
                Some(line) => line,
                None => match state.body.next().await {
                    Some(Ok(chunk)) => {
                        state.buffer.extend_from_slice(&chunk);
                        continue;
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                    None => {
                        // Body ended; a final line may lack its newline
                        state.done = true;
                        if state.buffer.is_empty() {
                            return None;
                        }
                        let rest = std::mem::take(&mut state.buffer);
                        String::from_utf8_lossy(&rest).into_owned()
                    }
                },
            };

            match parse_sse_line(&line) {
                Ok(Some(SseEvent::Token(text))) => return Some((Ok(text), state)),
                Ok(Some(SseEvent::Done)) => return None,
                Ok(None) => continue,
                Err(e) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
            }
        }
    })
    .boxed()
}
