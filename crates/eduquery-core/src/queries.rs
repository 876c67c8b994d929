use anyhow::{anyhow, Context, Result};
use log::error;
use serde::Deserialize;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Keys for the Cypher queries stored in the queries asset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryName {
    // Existence checks
    CourseExists,
    InstructorExists,
    StudentExists,

    // Creation
    CreateCourse,
    CreateInstructor,
    CreateAssessment,
    CreateModule,
    CreateStudent,
    CreateEnrollment,
    CreateCompletedAssessment,
    CreateCompletedModule,

    // Name index for entity matching
    CreateNameIndex,

    // Clean up
    DelNodesRelationships,
    DelNameIndex,

    // Pipeline
    EntityDbFulltextSearch,
}

impl QueryName {
    pub fn key(&self) -> &'static str {
        match self {
            QueryName::CourseExists => "course_exists",
            QueryName::InstructorExists => "instructor_exists",
            QueryName::StudentExists => "student_exists",
            QueryName::CreateCourse => "create_course",
            QueryName::CreateInstructor => "create_instructor",
            QueryName::CreateAssessment => "create_assessment",
            QueryName::CreateModule => "create_module",
            QueryName::CreateStudent => "create_student",
            QueryName::CreateEnrollment => "create_enrollment",
            QueryName::CreateCompletedAssessment => "create_completed_assessment",
            QueryName::CreateCompletedModule => "create_completed_module",
            QueryName::CreateNameIndex => "create_name_index",
            QueryName::DelNodesRelationships => "del_nodes_relationships",
            QueryName::DelNameIndex => "del_name_index",
            QueryName::EntityDbFulltextSearch => "entity_db_fulltext_search",
        }
    }
}

/// One few-shot question/query pair shown to the LLM.
#[derive(Debug, Deserialize, Clone)]
pub struct QueryExample {
    pub question: String,
    pub query: String,
}

/// Read-only store of named Cypher queries and few-shot examples, loaded
/// once at construction and shared for the process lifetime.
pub struct CypherQueryRepository {
    queries: HashMap<String, String>,
    examples: Vec<QueryExample>,
}

impl CypherQueryRepository {
    pub fn new(examples_file: &Path, queries_file: &Path) -> Result<Self> {
        let examples: Vec<QueryExample> = load_json(examples_file)?;
        let queries: HashMap<String, String> = load_json(queries_file)?;
        Ok(Self { queries, examples })
    }

    /// Retrieve a Cypher query by name.
    pub fn get(&self, name: QueryName) -> Result<&str> {
        self.queries
            .get(name.key())
            .map(String::as_str)
            .ok_or_else(|| {
                error!("Query '{}' not found in the repository", name.key());
                anyhow!("Query '{}' not found in the repository", name.key())
            })
    }

    pub fn examples(&self) -> &[QueryExample] {
        &self.examples
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read asset file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Malformed JSON in asset file {}", path.display()))
}
