use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

/// Top-level application configuration, loaded from a YAML file.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Provider key selecting which entry of `llm` drives the pipeline.
    pub use_llm: String,
    pub llm: HashMap<String, LlmConfig>,
    pub db: DbConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: String,
    pub temperature: Option<f64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DbConfig {
    pub neo4j: Neo4jSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub queries_file: PathBuf,
    pub examples_file: PathBuf,
    pub prompts_file: PathBuf,
}

impl AppConfig {
    /// The configuration block for the selected provider.
    pub fn selected_llm(&self) -> Result<&LlmConfig> {
        self.llm.get(&self.use_llm).ok_or_else(|| {
            anyhow!(
                "LLM provider '{}' has no configuration block",
                self.use_llm
            )
        })
    }
}

/// Load and parse the application config, resolving `${VAR}` placeholders
/// from the process environment so credentials stay out of the file.
pub fn load_app_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let mut raw: serde_yaml::Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Malformed YAML in config file {}", path.display()))?;
    resolve_env_placeholders(&mut raw)?;
    let config: AppConfig =
        serde_yaml::from_value(raw).context("Could not parse application config")?;
    debug!("Loaded application config from {}", path.display());
    Ok(config)
}

fn resolve_env_placeholders(value: &mut serde_yaml::Value) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => {
            if s.starts_with("${") && s.ends_with('}') {
                let env_key = &s[2..s.len() - 1];
                debug!("Looking up environment variable: {}", env_key);
                let resolved = env::var(env_key).map_err(|e| {
                    anyhow!("Failed to resolve environment variable '{}': {}", env_key, e)
                })?;
                *s = resolved;
            }
            Ok(())
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                resolve_env_placeholders(v)?;
            }
            Ok(())
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq.iter_mut() {
                resolve_env_placeholders(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
