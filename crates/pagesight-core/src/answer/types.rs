use crate::highlight::HighlightResult;
use crate::index::DocumentId;
use crate::retrieval::RetrievedPage;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A retrieved page handed to the answer service as visual context.
#[derive(Debug, Clone)]
pub struct ContextPage {
    pub document_id: DocumentId,
    pub page_number: u32,
    pub image: Arc<RgbImage>,
}

impl From<&RetrievedPage> for ContextPage {
    fn from(page: &RetrievedPage) -> Self {
        Self {
            document_id: page.page.document_id,
            page_number: page.page.page_number,
            image: page.page_image.clone(),
        }
    }
}

/// A generated answer with the pages that support it.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Answer text with the keyword section removed
    pub text: String,
    /// Keywords the service listed as supporting evidence
    pub keywords: Vec<String>,
    /// Pages used as context, in ranking order
    pub pages: Vec<RetrievedPage>,
    /// Document of the best page, if any page was retrieved
    pub document_used: Option<DocumentId>,
    /// Page number of the best page
    pub page_used: Option<u32>,
    /// Keyword overlays, one per context page, in the same order as `pages`.
    /// Empty when the answer listed no keywords.
    pub keyword_highlights: Vec<HighlightResult>,
}
