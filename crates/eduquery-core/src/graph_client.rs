use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use neo4rs::{query, ConfigBuilder, Database, Graph};
use serde_json::Value;

use crate::config::Neo4jSettings;
use crate::traits::GraphStore;
use crate::types::RelationshipSchema;

// Schema introspection relies on APOC, which ships with standard Neo4j
// distributions.
const NODE_PROPERTIES_QUERY: &str = r#"
CALL apoc.meta.data()
YIELD label, other, elementType, type, property
WHERE NOT type = "RELATIONSHIP" AND elementType = "node"
WITH label AS nodeLabel, collect(property + ": " + type) AS properties
RETURN {label: nodeLabel, properties: properties} AS output
"#;

const REL_PROPERTIES_QUERY: &str = r#"
CALL apoc.meta.data()
YIELD label, other, elementType, type, property
WHERE NOT type = "RELATIONSHIP" AND elementType = "relationship"
WITH label AS relType, collect(property + ": " + type) AS properties
RETURN {type: relType, properties: properties} AS output
"#;

const REL_QUERY: &str = r#"
CALL apoc.meta.data()
YIELD label, other, elementType, type, property
WHERE type = "RELATIONSHIP" AND elementType = "node"
UNWIND other AS other_node
RETURN {start: label, type: property, end: toString(other_node)} AS output
"#;

/// Bolt client for the course graph.
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    pub async fn connect(config: &Neo4jSettings) -> Result<Self> {
        let graph_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(Database::from(config.database.as_str()))
            .build()?;

        let graph = Graph::connect(graph_config).await?;

        Ok(GraphClient { graph })
    }

    async fn execute_cypher(
        &self,
        cypher: &str,
        params: Vec<(String, String)>,
    ) -> Result<Vec<Value>> {
        debug!("Executing Cypher query: {}", cypher);

        let mut q = query(cypher);
        for (name, value) in params {
            q = q.param(&name, value);
        }

        let mut txn = self.graph.start_txn().await?;
        let mut stream = txn.execute(q).await?;

        let mut rows = Vec::new();
        while let Some(row) = stream.next(txn.handle()).await? {
            let value = row
                .to::<Value>()
                .map_err(|e| anyhow!("Failed to convert row to JSON: {}", e))?;
            rows.push(value);
        }
        txn.commit().await?;

        Ok(rows)
    }

    /// Run an introspection query and collect its `output` column.
    async fn meta_outputs(&self, introspection: &str) -> Result<Vec<Value>> {
        let rows = self.execute_cypher(introspection, Vec::new()).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.get_mut("output").map(Value::take))
            .collect())
    }
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn run(&self, cypher: &str, params: Vec<(String, String)>) -> Result<Vec<Value>> {
        self.execute_cypher(cypher, params).await
    }

    async fn schema_text(&self) -> Result<String> {
        let node_props = self.meta_outputs(NODE_PROPERTIES_QUERY).await?;
        let rel_props = self.meta_outputs(REL_PROPERTIES_QUERY).await?;
        let triples = self.relationship_schema().await?;

        let formatted: Vec<String> = triples
            .iter()
            .map(|t| format!("(:{})-[:{}]->(:{})", t.start, t.rel_type, t.end))
            .collect();

        Ok(format!(
            "Node properties are the following:\n{}\nRelationship properties are the following:\n{}\nThe relationships are the following:\n{}",
            serde_json::to_string(&node_props)?,
            serde_json::to_string(&rel_props)?,
            formatted.join("\n")
        ))
    }

    async fn relationship_schema(&self) -> Result<Vec<RelationshipSchema>> {
        let outputs = self.meta_outputs(REL_QUERY).await?;

        let mut triples = Vec::new();
        for output in outputs {
            let field = |key: &str| -> Result<String> {
                output[key]
                    .as_str()
                    .map(String::from)
                    .ok_or_else(|| anyhow!("Malformed relationship schema row: {}", output))
            };
            triples.push(RelationshipSchema {
                start: field("start")?,
                rel_type: field("type")?,
                end: field("end")?,
            });
        }
        Ok(triples)
    }
}
