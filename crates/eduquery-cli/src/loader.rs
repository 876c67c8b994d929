//! CSV to graph loader.
//!
//! Loads course folders into the store one row at a time with existence
//! checks, so re-running over the same data directory is harmless. Opted
//! for per-file functions over a single LOAD statement so file-specific
//! preprocessing can be added where needed.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::Deserialize;

use eduquery_core::queries::{CypherQueryRepository, QueryName};
use eduquery_core::traits::GraphStore;

#[derive(Debug, Deserialize)]
struct InstructorRow {
    instructor_id: String,
    instructor_name: String,
}

#[derive(Debug, Deserialize)]
struct StudentRow {
    student_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AssessmentRow {
    assessment_id: String,
    assessment_name: String,
}

#[derive(Debug, Deserialize)]
struct ModuleRow {
    module_id: String,
    module_name: String,
}

#[derive(Debug, Deserialize)]
struct AssessmentCompletionRow {
    completion_id: String,
    assessment_id: String,
    student_id: String,
    score: String,
    attempts: String,
}

#[derive(Debug, Deserialize)]
struct ModuleCompletionRow {
    completion_id: String,
    student_id: String,
    module_id: String,
    minutes_spent: String,
    feedback: String,
    rating: String,
}

#[derive(Debug, PartialEq, Eq)]
struct CourseFolder {
    course_id: String,
    semester: String,
    section_number: String,
}

fn parse_folder_name(name: &str) -> Result<CourseFolder> {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() != 3 {
        return Err(anyhow!(
            "Course folder '{}' is not named course_semester_section",
            name
        ));
    }
    Ok(CourseFolder {
        course_id: parts[0].to_string(),
        semester: parts[1].to_string(),
        section_number: parts[2].to_string(),
    })
}

/// One-shot idempotent loader for course CSV folders.
pub struct CourseLoader<'a> {
    graph: &'a dyn GraphStore,
    queries: &'a CypherQueryRepository,
}

impl<'a> CourseLoader<'a> {
    pub fn new(graph: &'a dyn GraphStore, queries: &'a CypherQueryRepository) -> Self {
        Self { graph, queries }
    }

    pub async fn load_data_dir(&self, data_dir: &Path) -> Result<()> {
        for entry in fs::read_dir(data_dir)
            .with_context(|| format!("Failed to read data directory {}", data_dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                info!("Skipping non-directory item: {}", path.display());
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            info!("Processing course folder: {}", name);
            self.process_course_folder(&path, &name)
                .await
                .with_context(|| format!("Failed to load course folder '{}'", name))?;
        }

        // Entity matching relies on the name index; make sure it exists.
        self.graph
            .run(self.queries.get(QueryName::CreateNameIndex)?, Vec::new())
            .await?;
        Ok(())
    }

    async fn process_course_folder(&self, folder: &Path, name: &str) -> Result<()> {
        let course = parse_folder_name(name)?;

        if self.course_exists(&course).await? {
            info!(
                "Course {} for {} section {} already exists. Skipping",
                course.course_id, course.semester, course.section_number
            );
            return Ok(());
        }
        self.create_course(&course).await?;

        self.load_instructors(&folder.join("instructor.csv"), &course)
            .await?;
        self.load_students(&folder.join("students.csv"), &course)
            .await?;
        self.load_assessments(&folder.join("assessments.csv"), &course)
            .await?;
        self.load_modules(&folder.join("modules.csv"), &course)
            .await?;
        self.load_assessment_completions(&folder.join("student_assessment_completions.csv"))
            .await?;
        self.load_module_completions(&folder.join("student_module_completions.tsv"))
            .await?;
        Ok(())
    }

    async fn exists(&self, name: QueryName, params: Vec<(String, String)>) -> Result<bool> {
        let rows = self.graph.run(self.queries.get(name)?, params).await?;
        Ok(!rows.is_empty())
    }

    async fn course_exists(&self, course: &CourseFolder) -> Result<bool> {
        self.exists(QueryName::CourseExists, course_params(course))
            .await
    }

    async fn create_course(&self, course: &CourseFolder) -> Result<()> {
        self.graph
            .run(
                self.queries.get(QueryName::CreateCourse)?,
                course_params(course),
            )
            .await?;
        Ok(())
    }

    async fn load_instructors(&self, file: &Path, course: &CourseFolder) -> Result<()> {
        if !file.exists() {
            return Ok(());
        }
        let mut reader = csv::Reader::from_path(file)?;
        for row in reader.deserialize() {
            let row: InstructorRow = row?;
            if self
                .exists(
                    QueryName::InstructorExists,
                    vec![("instructor_id".to_string(), row.instructor_id.clone())],
                )
                .await?
            {
                info!("Instructor {} already exists, skipping", row.instructor_id);
                continue;
            }
            let mut params = course_params(course);
            params.push(("instructor_id".to_string(), row.instructor_id));
            params.push(("instructor_name".to_string(), row.instructor_name));
            self.graph
                .run(self.queries.get(QueryName::CreateInstructor)?, params)
                .await?;
        }
        info!("Added instructors");
        Ok(())
    }

    async fn load_students(&self, file: &Path, course: &CourseFolder) -> Result<()> {
        if !file.exists() {
            return Ok(());
        }
        let mut reader = csv::Reader::from_path(file)?;
        for row in reader.deserialize() {
            let row: StudentRow = row?;
            // Known students are not recreated, but they are still enrolled
            // in this course.
            if self
                .exists(
                    QueryName::StudentExists,
                    vec![("student_id".to_string(), row.student_id.clone())],
                )
                .await?
            {
                info!(
                    "Student {} already exists, skipping node creation",
                    row.student_id
                );
            } else {
                self.graph
                    .run(
                        self.queries.get(QueryName::CreateStudent)?,
                        vec![
                            ("student_id".to_string(), row.student_id.clone()),
                            ("student_name".to_string(), row.name),
                        ],
                    )
                    .await?;
            }

            self.graph
                .run(
                    self.queries.get(QueryName::CreateEnrollment)?,
                    vec![
                        ("student_id".to_string(), row.student_id),
                        ("course_id".to_string(), course.course_id.clone()),
                    ],
                )
                .await?;
        }
        info!("Added students");
        Ok(())
    }

    async fn load_assessments(&self, file: &Path, course: &CourseFolder) -> Result<()> {
        if !file.exists() {
            return Ok(());
        }
        let mut reader = csv::Reader::from_path(file)?;
        for row in reader.deserialize() {
            let row: AssessmentRow = row?;
            self.graph
                .run(
                    self.queries.get(QueryName::CreateAssessment)?,
                    vec![
                        ("assessment_id".to_string(), row.assessment_id),
                        ("assessment_name".to_string(), row.assessment_name),
                        ("course_id".to_string(), course.course_id.clone()),
                    ],
                )
                .await?;
        }
        info!("Added assessments");
        Ok(())
    }

    async fn load_modules(&self, file: &Path, course: &CourseFolder) -> Result<()> {
        if !file.exists() {
            return Ok(());
        }
        let mut reader = csv::Reader::from_path(file)?;
        for row in reader.deserialize() {
            let row: ModuleRow = row?;
            self.graph
                .run(
                    self.queries.get(QueryName::CreateModule)?,
                    vec![
                        ("module_id".to_string(), row.module_id),
                        ("module_name".to_string(), row.module_name),
                        ("course_id".to_string(), course.course_id.clone()),
                    ],
                )
                .await?;
        }
        info!("Added modules");
        Ok(())
    }

    async fn load_assessment_completions(&self, file: &Path) -> Result<()> {
        if !file.exists() {
            return Ok(());
        }
        let mut reader = csv::Reader::from_path(file)?;
        for row in reader.deserialize() {
            let row: AssessmentCompletionRow = row?;
            self.graph
                .run(
                    self.queries.get(QueryName::CreateCompletedAssessment)?,
                    vec![
                        ("completion_id".to_string(), row.completion_id),
                        ("assessment_id".to_string(), row.assessment_id),
                        ("student_id".to_string(), row.student_id),
                        ("score".to_string(), row.score),
                        ("attempts".to_string(), row.attempts),
                    ],
                )
                .await?;
        }
        info!("Added assessment completions");
        Ok(())
    }

    async fn load_module_completions(&self, file: &Path) -> Result<()> {
        if !file.exists() {
            return Ok(());
        }
        let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(file)?;
        for row in reader.deserialize() {
            let row: ModuleCompletionRow = row?;
            self.graph
                .run(
                    self.queries.get(QueryName::CreateCompletedModule)?,
                    vec![
                        ("completion_id".to_string(), row.completion_id),
                        ("student_id".to_string(), row.student_id),
                        ("module_id".to_string(), row.module_id),
                        ("minutes_spent".to_string(), row.minutes_spent),
                        ("feedback".to_string(), row.feedback),
                        ("rating".to_string(), row.rating),
                    ],
                )
                .await?;
        }
        info!("Added module completions");
        Ok(())
    }
}

fn course_params(course: &CourseFolder) -> Vec<(String, String)> {
    vec![
        ("course_id".to_string(), course.course_id.clone()),
        ("semester".to_string(), course.semester.clone()),
        ("section_number".to_string(), course.section_number.clone()),
    ]
}
