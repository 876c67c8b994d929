// crates/eduquery-pipeline/src/lib.rs
pub mod graph_pipeline;

use anyhow::Result;
use async_trait::async_trait;

/// The capability set of a question-answering pipeline over the graph.
///
/// The stages are exposed individually so each one can be exercised on its
/// own; `ask` composes them for one request.
#[async_trait]
pub trait QueryPipeline: Send + Sync {
    /// Extract the entity names mentioned in the question.
    async fn recognize_entities(&self, question: &str) -> Result<Vec<String>>;

    /// Look up each entity in the store and describe the best match.
    async fn map_entities(&self, names: &[String]) -> Result<String>;

    /// Produce a candidate Cypher query for the question.
    async fn generate_cypher(&self, question: &str, entities_list: &str) -> Result<String>;

    /// Validate the query against the live schema, execute it and phrase
    /// the result as a natural-language answer.
    async fn validate_and_respond(&self, question: &str, cypher: &str) -> Result<String>;

    /// Run the full pipeline for one question.
    async fn ask(&self, question: &str, verbose: bool) -> Result<String>;
}
