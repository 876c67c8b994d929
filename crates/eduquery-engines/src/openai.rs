use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};

use eduquery_core::config::LlmConfig;
use eduquery_core::traits::ChatModel;
use eduquery_core::types::{ChatRequest, ChatResponse, Usage};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

// Structured output goes through a forced tool call; the name is only a
// handle the model echoes back.
const STRUCTURED_TOOL_NAME: &str = "record_result";

pub struct OpenAIEngine {
    api_key: String,
    model: String,
    temperature: f64,
    max_retries: u32,
    client: Client,
}

impl OpenAIEngine {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(anyhow!("API key not configured for the openai provider"));
        }

        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature.unwrap_or(0.0),
            max_retries: config.max_retries,
            client: Client::new(),
        })
    }

    fn build_payload(&self, request: &ChatRequest) -> Value {
        let mut payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user }
            ],
        });
        if !request.stop.is_empty() {
            payload["stop"] = json!(request.stop);
        }
        payload
    }

    async fn send_request(&self, payload: &Value) -> Result<Value> {
        let mut attempt = 0;
        loop {
            let outcome = self
                .client
                .post(OPENAI_CHAT_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(payload)
                .send()
                .await;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if (status.is_server_error() || status.as_u16() == 429)
                        && attempt < self.max_retries
                    {
                        attempt += 1;
                        warn!(
                            "OpenAI request failed with status {} (attempt {}/{}), retrying",
                            status, attempt, self.max_retries
                        );
                        continue;
                    }

                    let response_body: Value = response.json().await?;
                    debug!("OpenAI response: {:?}", response_body);

                    if let Some(error) = response_body.get("error") {
                        return Err(anyhow!("OpenAI API error: {:?}", error));
                    }
                    return Ok(response_body);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "OpenAI request error (attempt {}/{}): {}",
                        attempt, self.max_retries, e
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn extract_usage(response: &Value) -> Usage {
        Usage {
            prompt_tokens: response["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: response["usage"]["completion_tokens"].as_u64().unwrap_or(0)
                as u32,
            total_tokens: response["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAIEngine {
    async fn execute(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let payload = self.build_payload(request);
        debug!("OpenAI request: {:?}", payload);

        let response_body = self.send_request(&payload).await?;

        let content = response_body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Failed to extract content from OpenAI response"))?
            .to_string();

        let model = response_body["model"]
            .as_str()
            .unwrap_or(&self.model)
            .to_string();
        let finish_reason = response_body["choices"][0]["finish_reason"]
            .as_str()
            .map(String::from);

        Ok(ChatResponse {
            content,
            usage: Self::extract_usage(&response_body),
            model,
            finish_reason,
        })
    }

    async fn execute_structured(&self, request: &ChatRequest, schema: &Value) -> Result<Value> {
        let mut payload = self.build_payload(request);
        payload["tools"] = json!([{
            "type": "function",
            "function": {
                "name": STRUCTURED_TOOL_NAME,
                "description": "Record the extracted result.",
                "parameters": schema
            }
        }]);
        payload["tool_choice"] = json!({
            "type": "function",
            "function": { "name": STRUCTURED_TOOL_NAME }
        });
        debug!("OpenAI structured request: {:?}", payload);

        let response_body = self.send_request(&payload).await?;

        let arguments = response_body["choices"][0]["message"]["tool_calls"][0]["function"]
            ["arguments"]
            .as_str()
            .ok_or_else(|| anyhow!("OpenAI response contains no tool call arguments"))?;
        serde_json::from_str(arguments)
            .map_err(|e| anyhow!("OpenAI structured output is not valid JSON: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> OpenAIEngine {
        OpenAIEngine::new(&LlmConfig {
            model: "gpt-4o-mini".to_string(),
            api_key: "key".to_string(),
            temperature: None,
            max_retries: 0,
        })
        .expect("engine constructs")
    }

    #[test]
    fn payload_carries_system_and_user_messages() {
        let request = ChatRequest {
            system: "sys".to_string(),
            user: "hello".to_string(),
            stop: Vec::new(),
        };
        let payload = engine().build_payload(&request);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][0]["content"], "sys");
        assert_eq!(payload["messages"][1]["role"], "user");
        assert_eq!(payload["messages"][1]["content"], "hello");
        assert!(payload.get("stop").is_none());
    }

    #[test]
    fn stop_sequences_are_forwarded() {
        let request = ChatRequest {
            system: String::new(),
            user: String::new(),
            stop: vec!["\nCypherResult:".to_string()],
        };
        let payload = engine().build_payload(&request);
        assert_eq!(payload["stop"], json!(["\nCypherResult:"]));
    }
}
