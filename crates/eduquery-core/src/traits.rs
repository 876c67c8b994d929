use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::types::{ChatRequest, ChatResponse, RelationshipSchema};

/// A chat-completion model. Implementations live in `eduquery-engines`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Free-form completion.
    async fn execute(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Completion constrained to a JSON schema; returns the parsed value.
    async fn execute_structured(&self, request: &ChatRequest, schema: &Value) -> Result<Value>;
}

/// Access to the backing graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute a Cypher query with string parameters and return the rows as
    /// JSON objects keyed by field name.
    async fn run(&self, cypher: &str, params: Vec<(String, String)>) -> Result<Vec<Value>>;

    /// Human-readable rendering of the live schema, suitable for prompting.
    async fn schema_text(&self) -> Result<String>;

    /// Structured relationship triples from the live schema.
    async fn relationship_schema(&self) -> Result<Vec<RelationshipSchema>>;
}
