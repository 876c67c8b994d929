use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A system/human message pair ready to be rendered.
#[derive(Debug, Clone)]
pub struct PromptPair {
    pub system: String,
    pub human: String,
}

/// Prompts are stored in the asset file as arrays of lines so they stay
/// readable under version control.
#[derive(Debug, Deserialize)]
struct RawPrompt {
    system: Vec<String>,
    human: Vec<String>,
}

/// Read-only store of named prompt templates, loaded once at construction.
pub struct PromptRepository {
    prompts: HashMap<String, PromptPair>,
}

impl PromptRepository {
    pub fn new(prompts_file: &Path) -> Result<Self> {
        let content = fs::read_to_string(prompts_file)
            .with_context(|| format!("Failed to read asset file {}", prompts_file.display()))?;
        let raw: HashMap<String, RawPrompt> = serde_json::from_str(&content)
            .with_context(|| format!("Malformed JSON in asset file {}", prompts_file.display()))?;
        let prompts = raw
            .into_iter()
            .map(|(name, p)| {
                (
                    name,
                    PromptPair {
                        system: p.system.join(" \n "),
                        human: p.human.join(" \n "),
                    },
                )
            })
            .collect();
        Ok(Self { prompts })
    }

    /// Prompt pair for named entity recognition.
    pub fn ner_prompt(&self) -> Result<&PromptPair> {
        self.get("entityRecognition")
    }

    /// Prompt pair for Cypher query generation.
    pub fn cypher_prompt(&self) -> Result<&PromptPair> {
        self.get("cypherPrompt")
    }

    /// Prompt pair for phrasing the final response.
    pub fn response_prompt(&self) -> Result<&PromptPair> {
        self.get("responsePrompt")
    }

    fn get(&self, key: &str) -> Result<&PromptPair> {
        self.prompts
            .get(key)
            .ok_or_else(|| anyhow!("Prompt '{}' not found in the repository", key))
    }
}

/// Substitute `{name}` placeholders in a prompt template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}
