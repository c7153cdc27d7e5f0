//! Conversational answering over retrieved pages.
//!
//! [`RagPipeline`] condenses a conversation into one query, retrieves the best
//! pages for it and asks an [`AnswerGenerator`] to answer from the page
//! images. Keywords the answer cites are highlighted on those pages.

pub mod keywords;
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod traits;
pub mod types;

pub use keywords::{extract_keywords, strip_keywords};
pub use openai::{parse_sse_line, OpenAiAnswerGenerator, OpenAiConfig, SseEvent};
pub use pipeline::{AnswerStream, RagPipeline};
pub use prompt::compose_query;
pub use traits::{AnswerGenerator, TokenStream};
pub use types::{Answer, ContextPage, ConversationTurn, Role};
