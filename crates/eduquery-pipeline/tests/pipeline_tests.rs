use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use eduquery_core::prompts::PromptRepository;
use eduquery_core::queries::CypherQueryRepository;
use eduquery_core::traits::{ChatModel, GraphStore};
use eduquery_core::types::{ChatRequest, ChatResponse, RelationshipSchema, Usage};
use eduquery_pipeline::graph_pipeline::GraphQueryPipeline;
use eduquery_pipeline::QueryPipeline;

const PROMPTS_JSON: &str = r#"{
    "entityRecognition": {
        "system": ["You are extracting entity names from the text."],
        "human": ["Extract entities from the following input: {question}"]
    },
    "cypherPrompt": {
        "system": ["Convert the question to a Cypher query."],
        "human": ["Schema: {schema}", "Examples: {examples}", "Entities: {entities_list}", "Question: {question}", "CypherQuery:"]
    },
    "responsePrompt": {
        "system": ["Phrase the query result as an answer."],
        "human": ["Question: {question}", "CypherQuery: {query}", "CypherResult: {response}"]
    }
}"#;

const QUERIES_JSON: &str = r#"{
    "entity_db_fulltext_search": "CALL db.index.fulltext.queryNodes('nameIndex', $value) YIELD node, score RETURN labels(node)[0] AS type, properties(node) AS result ORDER BY score DESC LIMIT 1"
}"#;

const EXAMPLES_JSON: &str = r#"[
    {"question": "Who teaches CS101?", "query": "MATCH (i:Instructor)-[:TEACHES]->(c:Course {course_id: 'CS101'}) RETURN i.name"}
]"#;

fn write_assets(dir: &Path) -> (PromptRepository, CypherQueryRepository) {
    let prompts_file = dir.join("graph_prompts.json");
    let queries_file = dir.join("graph_queries.json");
    let examples_file = dir.join("graph_examples.json");
    fs::write(&prompts_file, PROMPTS_JSON).expect("write prompts");
    fs::write(&queries_file, QUERIES_JSON).expect("write queries");
    fs::write(&examples_file, EXAMPLES_JSON).expect("write examples");

    let prompts = PromptRepository::new(&prompts_file).expect("load prompts");
    let queries = CypherQueryRepository::new(&examples_file, &queries_file).expect("load queries");
    (prompts, queries)
}

/// Chat model double: structured calls return a fixed entity list, the
/// cypher stage (recognizable by its stop sequence) returns a fixed query
/// and the answer stage echoes its rendered prompt so tests can observe
/// what data reached it.
struct MockChatModel {
    entities: Value,
    cypher: String,
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn execute(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let content = if request.stop.is_empty() {
            format!("Answer based on: {}", request.user)
        } else {
            self.cypher.clone()
        };
        Ok(ChatResponse {
            content,
            usage: Usage::default(),
            model: "mock".to_string(),
            finish_reason: None,
        })
    }

    async fn execute_structured(&self, _request: &ChatRequest, _schema: &Value) -> Result<Value> {
        Ok(self.entities.clone())
    }
}

/// Graph store double: calls carrying a `value` parameter are full-text
/// lookups answered from `matches`; anything else is treated as query
/// execution, recorded and answered from `query_results`.
struct MockGraphStore {
    matches: HashMap<String, Vec<Value>>,
    query_results: Vec<Value>,
    schema: Vec<RelationshipSchema>,
    executed: Mutex<Vec<String>>,
}

impl MockGraphStore {
    fn new(schema: Vec<RelationshipSchema>) -> Self {
        Self {
            matches: HashMap::new(),
            query_results: Vec::new(),
            schema,
            executed: Mutex::new(Vec::new()),
        }
    }

    fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().expect("lock").clone()
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn run(&self, cypher: &str, params: Vec<(String, String)>) -> Result<Vec<Value>> {
        if let Some((_, value)) = params.iter().find(|(name, _)| name == "value") {
            return Ok(self.matches.get(value).cloned().unwrap_or_default());
        }
        self.executed.lock().expect("lock").push(cypher.to_string());
        Ok(self.query_results.clone())
    }

    async fn schema_text(&self) -> Result<String> {
        Ok("(:Student)-[:ENROLLED_IN]->(:Course)".to_string())
    }

    async fn relationship_schema(&self) -> Result<Vec<RelationshipSchema>> {
        Ok(self.schema.clone())
    }
}

fn course_schema() -> Vec<RelationshipSchema> {
    vec![
        RelationshipSchema {
            start: "Student".to_string(),
            rel_type: "ENROLLED_IN".to_string(),
            end: "Course".to_string(),
        },
        RelationshipSchema {
            start: "Student".to_string(),
            rel_type: "COMPLETED".to_string(),
            end: "Assessment".to_string(),
        },
    ]
}

fn pipeline(
    store: MockGraphStore,
    entities: Value,
    cypher: &str,
) -> (GraphQueryPipeline, Arc<MockGraphStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let (prompts, queries) = write_assets(dir.path());
    let store = Arc::new(store);
    let llm = Arc::new(MockChatModel {
        entities,
        cypher: cypher.to_string(),
    });
    (
        GraphQueryPipeline::new(store.clone(), llm, prompts, queries),
        store,
    )
}

#[tokio::test]
async fn mapping_is_empty_when_nothing_matches() {
    let store = MockGraphStore::new(course_schema());
    let (pipeline, _) = pipeline(store, json!({"names": []}), "RETURN 1");

    let names = vec!["Alice".to_string(), "Bob".to_string()];
    let summary = pipeline.map_entities(&names).await.expect("map entities");
    assert_eq!(summary, "");
}

#[tokio::test]
async fn mapping_formats_a_single_match_exactly() {
    let mut store = MockGraphStore::new(course_schema());
    store.matches.insert(
        "Tom Hanks".to_string(),
        vec![json!({"type": "Student", "result": {"name": "Tom Hanks"}})],
    );
    let (pipeline, _) = pipeline(store, json!({"names": []}), "RETURN 1");

    let names = vec!["Tom Hanks".to_string()];
    let summary = pipeline.map_entities(&names).await.expect("map entities");
    assert_eq!(
        summary,
        "Tom Hanks maps to Student node with properties: {\"name\":\"Tom Hanks\"} in database\n"
    );
}

#[tokio::test]
async fn only_the_first_match_is_kept() {
    let mut store = MockGraphStore::new(course_schema());
    store.matches.insert(
        "CS101".to_string(),
        vec![
            json!({"type": "Course", "result": {"course_id": "CS101"}}),
            json!({"type": "Module", "result": {"name": "CS101 Intro"}}),
        ],
    );
    let (pipeline, _) = pipeline(store, json!({"names": []}), "RETURN 1");

    let names = vec!["CS101".to_string()];
    let summary = pipeline.map_entities(&names).await.expect("map entities");
    assert!(summary.contains("Course node"));
    assert!(!summary.contains("Module node"));
}

#[tokio::test]
async fn unknown_relationship_never_reaches_execution_unmodified() {
    let store = MockGraphStore::new(course_schema());
    let hallucinated = "MATCH (s:Student)-[:TAUGHT_BY]->(c:Course) RETURN s";
    let (pipeline, store) = pipeline(store, json!({"names": []}), hallucinated);

    // The corrected (empty) query is still executed; the mock store accepts
    // it, a real store would raise its own error.
    pipeline
        .validate_and_respond("who?", hallucinated)
        .await
        .expect("respond");

    let executed = store.executed_queries();
    assert_eq!(executed, vec![String::new()]);
}

#[tokio::test]
async fn reversed_relationship_is_corrected_before_execution() {
    let store = MockGraphStore::new(course_schema());
    let reversed = "MATCH (c:Course)-[:ENROLLED_IN]->(s:Student) RETURN s";
    let (pipeline, store) = pipeline(store, json!({"names": []}), reversed);

    pipeline
        .validate_and_respond("who?", reversed)
        .await
        .expect("respond");

    let executed = store.executed_queries();
    assert_eq!(
        executed,
        vec!["MATCH (c:Course)<-[:ENROLLED_IN]-(s:Student) RETURN s".to_string()]
    );
}

#[tokio::test]
async fn stage_assets_are_built_exactly_once() {
    let mut store = MockGraphStore::new(course_schema());
    store.query_results = vec![json!({"count": 1})];
    let (pipeline, _) = pipeline(
        store,
        json!({"names": []}),
        "MATCH (s:Student)-[:ENROLLED_IN]->(c:Course) RETURN count(s) AS count",
    );

    pipeline.ask("how many students?", false).await.expect("ask");
    pipeline.ask("how many students?", false).await.expect("ask");
    assert_eq!(pipeline.stage_builds(), 1);
}

#[tokio::test]
async fn answer_carries_the_query_result_through() {
    let mut store = MockGraphStore::new(course_schema());
    store.query_results = vec![json!({"count": 3})];
    store.matches.insert(
        "S1".to_string(),
        vec![json!({"type": "Student", "result": {"student_id": "S1"}})],
    );
    let (pipeline, _) = pipeline(
        store,
        json!({"names": ["S1"]}),
        "MATCH (s:Student {student_id: 'S1'})-[:COMPLETED]->(a:Assessment) RETURN count(a) AS count",
    );

    let answer = pipeline
        .ask("How many assessments has student S1 completed?", false)
        .await
        .expect("ask");
    assert!(answer.contains('3'), "answer should carry the count: {}", answer);
}

#[tokio::test]
async fn unmappable_entities_still_produce_an_answer() {
    let mut store = MockGraphStore::new(course_schema());
    store.query_results = vec![];
    let (pipeline, _) = pipeline(
        store,
        json!({"names": ["xyzzy", "plugh"]}),
        "MATCH (s:Student) RETURN s.name",
    );

    let answer = pipeline
        .ask("xyzzy plugh?", false)
        .await
        .expect("gibberish still answers");
    assert!(!answer.is_empty());
}

#[tokio::test]
async fn verbose_mode_runs_the_pipeline_once() {
    let mut store = MockGraphStore::new(course_schema());
    store.query_results = vec![json!({"count": 1})];
    let (pipeline, store) = pipeline(
        store,
        json!({"names": []}),
        "MATCH (s:Student)-[:ENROLLED_IN]->(c:Course) RETURN count(s) AS count",
    );

    pipeline.ask("how many?", true).await.expect("ask");
    // One execution against the store, not two.
    assert_eq!(store.executed_queries().len(), 1);
}
