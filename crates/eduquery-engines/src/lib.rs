// crates/eduquery-engines/src/lib.rs
pub mod google_gemini;
pub mod openai;

use anyhow::{anyhow, Result};
use log::error;

use eduquery_core::config::LlmConfig;
use eduquery_core::traits::ChatModel;

use crate::google_gemini::GoogleGeminiEngine;
use crate::openai::OpenAIEngine;

/// Construct a chat-model client for the named provider.
pub fn create_llm(provider: &str, config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match provider {
        "gemini" => Ok(Box::new(GoogleGeminiEngine::new(config)?)),
        "openai" => Ok(Box::new(OpenAIEngine::new(config)?)),
        other => {
            error!("LLM provider '{}' not supported", other);
            Err(anyhow!("Unsupported LLM provider: {}", other))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            model: "test-model".to_string(),
            api_key: "test-key".to_string(),
            temperature: None,
            max_retries: 1,
        }
    }

    #[test]
    fn unknown_provider_returns_uniform_error() {
        let err = create_llm("totally_unknown", &config())
            .err()
            .expect("should error");
        assert!(err.to_string().contains("Unsupported LLM provider"));
    }

    #[test]
    fn known_providers_construct() {
        assert!(create_llm("gemini", &config()).is_ok());
        assert!(create_llm("openai", &config()).is_ok());
    }

    #[test]
    fn missing_api_key_is_rejected_eagerly() {
        let mut cfg = config();
        cfg.api_key = String::new();
        assert!(create_llm("gemini", &cfg).is_err());
        assert!(create_llm("openai", &cfg).is_err());
    }
}
