//! Request/response shapes for the LLM client. Grounded on the
//! `Message`/`Role`/`LlmInvocation` split in `xchecker-llm`'s backend
//! abstraction, specialized to the three input channels an LLM-schema
//! extraction passes separately rather than folding into one prompt
//! string: document data, extraction hints, and operator instructions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// A request to extract structured fields from a document. `data`,
/// `hints`, and `instructions` are kept as three explicit channels
/// rather than merged into one string: `instructions` (the rule
/// author's prompt) becomes the system message, `data` (OCR text) and
/// `hints` (per-field extraction hints from the schema) are composed
/// into the user message, and `schema` constrains the response shape.
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    pub model: String,
    pub timeout: Duration,
    pub instructions: String,
    pub data: String,
    pub hints: Option<String>,
    pub schema: serde_json::Value,
}

impl LlmInvocation {
    #[must_use]
    pub fn to_messages(&self) -> Vec<Message> {
        let mut user_content = self.data.clone();
        if let Some(hints) = &self.hints {
            user_content.push_str("\n\nExtraction hints:\n");
            user_content.push_str(hints);
        }
        vec![Message::system(&self.instructions), Message::user(user_content)]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    pub raw_response: String,
    pub fields: serde_json::Value,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
}
