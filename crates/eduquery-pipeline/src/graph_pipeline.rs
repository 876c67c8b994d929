//! Graph-backed question answering.
//!
//! One request flows through four stages: entity recognition, entity to
//! graph mapping, Cypher generation and validation plus response phrasing.
//! Each stage delegates the heavy lifting to the LLM or the store; errors
//! propagate to the caller uncaught.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use eduquery_core::config::AppConfig;
use eduquery_core::corrector::CypherCorrector;
use eduquery_core::graph_client::GraphClient;
use eduquery_core::prompts::{render, PromptPair, PromptRepository};
use eduquery_core::queries::{CypherQueryRepository, QueryName};
use eduquery_core::traits::{ChatModel, GraphStore};
use eduquery_core::types::ChatRequest;

use crate::QueryPipeline;

// Few-shot examples and the cypher prompt share this convention: the query
// ends where the result would begin.
const CYPHER_STOP_SEQUENCE: &str = "\nCypherResult:";

/// The single concrete [`QueryPipeline`] implementation, backed by a graph
/// store and a chat model.
pub struct GraphQueryPipeline {
    graph: Arc<dyn GraphStore>,
    llm: Arc<dyn ChatModel>,
    prompt_repo: PromptRepository,
    query_repo: CypherQueryRepository,
    stages: OnceCell<Stages>,
    stage_builds: AtomicUsize,
}

/// Assets assembled once on first use and shared by every request.
struct Stages {
    ner_prompt: PromptPair,
    cypher_prompt: PromptPair,
    response_prompt: PromptPair,
    entity_schema: Value,
    examples: String,
    match_query: String,
}

impl GraphQueryPipeline {
    /// Wire up the pipeline from the application config: LLM client, store
    /// connection and both asset repositories.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let llm_config = config.selected_llm()?;
        let llm = eduquery_engines::create_llm(&config.use_llm, llm_config)?;
        let graph = GraphClient::connect(&config.db.neo4j).await?;
        let prompt_repo = PromptRepository::new(&config.db.neo4j.prompts_file)?;
        let query_repo = CypherQueryRepository::new(
            &config.db.neo4j.examples_file,
            &config.db.neo4j.queries_file,
        )?;
        Ok(Self::new(
            Arc::new(graph),
            Arc::from(llm),
            prompt_repo,
            query_repo,
        ))
    }

    pub fn new(
        graph: Arc<dyn GraphStore>,
        llm: Arc<dyn ChatModel>,
        prompt_repo: PromptRepository,
        query_repo: CypherQueryRepository,
    ) -> Self {
        Self {
            graph,
            llm,
            prompt_repo,
            query_repo,
            stages: OnceCell::new(),
            stage_builds: AtomicUsize::new(0),
        }
    }

    /// How many times the stage assets have been constructed. At most one
    /// construction happens per instance.
    pub fn stage_builds(&self) -> usize {
        self.stage_builds.load(Ordering::SeqCst)
    }

    async fn stages(&self) -> Result<&Stages> {
        self.stages
            .get_or_try_init(|| async { self.build_stages() })
            .await
    }

    fn build_stages(&self) -> Result<Stages> {
        self.stage_builds.fetch_add(1, Ordering::SeqCst);

        let examples = self
            .query_repo
            .examples()
            .iter()
            .map(|ex| format!("Question: {}\nCypherQuery: {}", ex.question, ex.query))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(Stages {
            ner_prompt: self.prompt_repo.ner_prompt()?.clone(),
            cypher_prompt: self.prompt_repo.cypher_prompt()?.clone(),
            response_prompt: self.prompt_repo.response_prompt()?.clone(),
            entity_schema: entity_schema(),
            examples,
            match_query: self
                .query_repo
                .get(QueryName::EntityDbFulltextSearch)?
                .to_string(),
        })
    }
}

/// Output schema for entity extraction: a single list of names.
fn entity_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "names": {
                "type": "array",
                "items": { "type": "string" },
                "description": "All the Students or Assessments or Modules or Instructors or Courses appearing in the text"
            }
        },
        "required": ["names"]
    })
}

/// Strip code-fence markers and collapse the query onto a single line.
pub fn clean_cypher_output(raw: &str) -> String {
    raw.replace("```cypher", "")
        .replace("```", "")
        .replace('\n', " ")
        .trim()
        .to_string()
}

#[async_trait]
impl QueryPipeline for GraphQueryPipeline {
    async fn recognize_entities(&self, question: &str) -> Result<Vec<String>> {
        let stages = self.stages().await?;
        let request = ChatRequest {
            system: stages.ner_prompt.system.clone(),
            user: render(&stages.ner_prompt.human, &[("question", question)]),
            stop: Vec::new(),
        };

        let extracted = self
            .llm
            .execute_structured(&request, &stages.entity_schema)
            .await?;
        let names = extracted["names"].as_array().ok_or_else(|| {
            anyhow!("Entity extraction returned no 'names' array: {}", extracted)
        })?;

        Ok(names
            .iter()
            .filter_map(|n| n.as_str().map(String::from))
            .collect())
    }

    async fn map_entities(&self, names: &[String]) -> Result<String> {
        let stages = self.stages().await?;

        let mut result = String::new();
        for name in names {
            let rows = self
                .graph
                .run(
                    &stages.match_query,
                    vec![("value".to_string(), name.clone())],
                )
                .await?;
            // Only the best match counts; names with no match contribute
            // nothing to the summary.
            if let Some(row) = rows.first() {
                let node_type = row["type"]
                    .as_str()
                    .ok_or_else(|| anyhow!("Full-text match has no 'type' field: {}", row))?;
                let props = serde_json::to_string(&row["result"])?;
                result.push_str(&format!(
                    "{} maps to {} node with properties: {} in database\n",
                    name, node_type, props
                ));
            }
        }
        Ok(result)
    }

    async fn generate_cypher(&self, question: &str, entities_list: &str) -> Result<String> {
        let stages = self.stages().await?;
        let schema = self.graph.schema_text().await?;

        let request = ChatRequest {
            system: stages.cypher_prompt.system.clone(),
            user: render(
                &stages.cypher_prompt.human,
                &[
                    ("schema", schema.as_str()),
                    ("examples", stages.examples.as_str()),
                    ("entities_list", entities_list),
                    ("question", question),
                ],
            ),
            stop: vec![CYPHER_STOP_SEQUENCE.to_string()],
        };

        let response = self.llm.execute(&request).await?;
        let cypher = clean_cypher_output(&response.content);
        info!("{}", cypher);
        Ok(cypher)
    }

    async fn validate_and_respond(&self, question: &str, cypher: &str) -> Result<String> {
        let stages = self.stages().await?;

        let corrector = CypherCorrector::new(self.graph.relationship_schema().await?);
        let corrected = corrector.correct(cypher);
        if corrected != cypher {
            debug!("Corrected Cypher query: {}", corrected);
        }

        // An empty corrected query is still sent to the store; the resulting
        // execution error propagates to the caller.
        let rows = self.graph.run(&corrected, Vec::new()).await?;

        let request = ChatRequest {
            system: stages.response_prompt.system.clone(),
            user: render(
                &stages.response_prompt.human,
                &[
                    ("question", question),
                    ("query", &corrected),
                    ("response", &serde_json::to_string(&rows)?),
                ],
            ),
            stop: Vec::new(),
        };

        let response = self.llm.execute(&request).await?;
        Ok(response.content.trim().to_string())
    }

    async fn ask(&self, question: &str, verbose: bool) -> Result<String> {
        // Verbose tracing wraps the one execution; a question is never run
        // twice for a single call.
        let names = self.recognize_entities(question).await?;
        if verbose {
            info!("Recognized entities: {:?}", names);
        }

        let entities_list = self.map_entities(&names).await?;
        if verbose {
            info!("Entity mapping:\n{}", entities_list);
        }

        let cypher = self.generate_cypher(question, &entities_list).await?;
        if verbose {
            info!("Generated Cypher: {}", cypher);
        }

        let answer = self.validate_and_respond(question, &cypher).await?;
        if verbose {
            info!("Answer: {}", answer);
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_cypher_strips_fences_and_newlines() {
        let raw = "```cypher\nMATCH (s:Student)\nRETURN s\n```";
        assert_eq!(clean_cypher_output(raw), "MATCH (s:Student) RETURN s");
    }

    #[test]
    fn clean_cypher_is_idempotent_on_clean_input() {
        let clean = "MATCH (s:Student) RETURN s";
        assert_eq!(clean_cypher_output(clean), clean);
        assert_eq!(clean_cypher_output(&clean_cypher_output(clean)), clean);
    }

    #[test]
    fn entity_schema_requires_names() {
        let schema = entity_schema();
        assert_eq!(schema["required"], json!(["names"]));
        assert_eq!(schema["properties"]["names"]["type"], "array");
    }
}
