//! Prompts and conversation-to-query composition.

use super::traits::AnswerGenerator;
use super::types::{ConversationTurn, Role};
use crate::error::RetrievalError;
use tracing::debug;

/// System prompt for answering from page images.
pub const ANSWER_SYSTEM_PROMPT: &str = "You are an assistant that answers questions based on \
the provided image context. Answer the user's question as accurately as possible using the \
context below. End your answer with a line of the form **Keywords:** 'keyword1', 'keyword2' \
listing the exact words or short phrases from the pages that support your answer.";

/// System prompt for summarizing earlier turns.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a summarization assistant.";

/// Sampling temperature for both answers and summaries.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// User prompt asking the service to condense `turns`.
pub fn summarization_prompt(turns: &[ConversationTurn]) -> String {
    let history = turns
        .iter()
        .map(|turn| format!("{}: {}", speaker(turn.role), turn.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Please summarize the following conversation context briefly. This will be sent to \
         the retrieval model for context.\nNote: This summarization is solely to maintain \
         context in the query without affecting retrieval. Provide only the essential \
         context information.\n\nConversation Context:\n{}",
        history
    )
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
    }
}

/// Turns a conversation into the text used for retrieval and answering.
///
/// With a single turn its content is used as is. With more, the earlier turns
/// are summarized by `generator` and the summary is put on the line before
/// the latest message.
///
/// # Errors
///
/// - `RetrievalError::InvalidQuery` if `history` is empty or the latest
///   message is blank
/// - `RetrievalError::AnswerGeneration` if summarization fails
pub async fn compose_query(
    history: &[ConversationTurn],
    generator: &dyn AnswerGenerator,
) -> Result<String, RetrievalError> {
    let Some((last, earlier)) = history.split_last() else {
        return Err(RetrievalError::InvalidQuery(
            "conversation is empty".to_string(),
        ));
    };
    let current = last.content.trim();
    if current.is_empty() {
        return Err(RetrievalError::InvalidQuery(
            "latest message is empty".to_string(),
        ));
    }
    if earlier.is_empty() {
        return Ok(current.to_string());
    }

    let summary = generator.summarize(earlier).await?;
    let summary = summary.trim();
    debug!(
        "Summarized {} earlier turns into {} chars",
        earlier.len(),
        summary.len()
    );
    if summary.is_empty() {
        Ok(current.to_string())
    } else {
        Ok(format!("{}\n{}", summary, current))
    }
}
