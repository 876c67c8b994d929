// crates/eduquery-core/src/types.rs
use serde::{Deserialize, Serialize};

/// One chat-completion call: system text, user text and optional stop
/// sequences. Built fresh for every pipeline stage invocation.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub stop: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Usage,
    pub model: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One relationship triple from the store's schema introspection.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RelationshipSchema {
    pub start: String,
    pub rel_type: String,
    pub end: String,
}
