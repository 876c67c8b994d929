use std::fs;
use std::path::PathBuf;

use eduquery_core::prompts::PromptRepository;
use eduquery_core::queries::{CypherQueryRepository, QueryName};

fn write_file(dir: &std::path::Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write asset");
    path
}

#[test]
fn queries_are_served_by_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queries = write_file(
        dir.path(),
        "graph_queries.json",
        r#"{"entity_db_fulltext_search": "CALL db.index.fulltext.queryNodes('nameIndex', $value)"}"#,
    );
    let examples = write_file(dir.path(), "graph_examples.json", "[]");

    let repo = CypherQueryRepository::new(&examples, &queries).expect("load");
    let query = repo.get(QueryName::EntityDbFulltextSearch).expect("get");
    assert!(query.starts_with("CALL db.index.fulltext.queryNodes"));
}

#[test]
fn missing_query_name_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queries = write_file(dir.path(), "graph_queries.json", "{}");
    let examples = write_file(dir.path(), "graph_examples.json", "[]");

    let repo = CypherQueryRepository::new(&examples, &queries).expect("load");
    let err = repo.get(QueryName::CreateCourse).err().expect("should error");
    assert!(err.to_string().contains("create_course"));
}

#[test]
fn malformed_asset_file_fails_at_construction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queries = write_file(dir.path(), "graph_queries.json", "not json");
    let examples = write_file(dir.path(), "graph_examples.json", "[]");

    assert!(CypherQueryRepository::new(&examples, &queries).is_err());
}

#[test]
fn examples_parse_into_question_query_pairs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queries = write_file(dir.path(), "graph_queries.json", "{}");
    let examples = write_file(
        dir.path(),
        "graph_examples.json",
        r#"[{"question": "Who teaches CS101?", "query": "MATCH (i:Instructor) RETURN i"}]"#,
    );

    let repo = CypherQueryRepository::new(&examples, &queries).expect("load");
    assert_eq!(repo.examples().len(), 1);
    assert_eq!(repo.examples()[0].question, "Who teaches CS101?");
}

#[test]
fn prompt_lines_are_joined_for_each_message() {
    let dir = tempfile::tempdir().expect("tempdir");
    let prompts = write_file(
        dir.path(),
        "graph_prompts.json",
        r#"{
            "entityRecognition": {
                "system": ["line one", "line two"],
                "human": ["input: {question}"]
            },
            "cypherPrompt": {"system": ["s"], "human": ["h"]},
            "responsePrompt": {"system": ["s"], "human": ["h"]}
        }"#,
    );

    let repo = PromptRepository::new(&prompts).expect("load");
    let ner = repo.ner_prompt().expect("ner prompt");
    assert_eq!(ner.system, "line one \n line two");
    assert_eq!(ner.human, "input: {question}");
}

#[test]
fn missing_prompt_key_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let prompts = write_file(
        dir.path(),
        "graph_prompts.json",
        r#"{"entityRecognition": {"system": [], "human": []}}"#,
    );

    let repo = PromptRepository::new(&prompts).expect("load");
    assert!(repo.cypher_prompt().is_err());
}
