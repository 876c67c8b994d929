use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};

use eduquery_core::config::LlmConfig;
use eduquery_core::traits::ChatModel;
use eduquery_core::types::{ChatRequest, ChatResponse, Usage};

pub struct GoogleGeminiEngine {
    api_key: String,
    model: String,
    temperature: f64,
    max_retries: u32,
    client: Client,
}

impl GoogleGeminiEngine {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(anyhow!("API key not configured for the gemini provider"));
        }

        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature.unwrap_or(0.0),
            max_retries: config.max_retries,
            client: Client::new(),
        })
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut generation_config = json!({
            "temperature": self.temperature,
        });
        if !request.stop.is_empty() {
            generation_config["stopSequences"] = json!(request.stop);
        }

        json!({
            "systemInstruction": {
                "parts": [{ "text": request.system }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.user }]
            }],
            "generationConfig": generation_config,
        })
    }

    async fn send_request(&self, body: &Value) -> Result<Value> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let mut attempt = 0;
        loop {
            let outcome = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let response_body: Value = response.json().await?;
                        debug!("Google Gemini response: {:?}", response_body);
                        return Ok(response_body);
                    }
                    let error_text = response.text().await.unwrap_or_default();
                    if (status.is_server_error() || status.as_u16() == 429)
                        && attempt < self.max_retries
                    {
                        attempt += 1;
                        warn!(
                            "Gemini request failed with status {} (attempt {}/{}), retrying",
                            status, attempt, self.max_retries
                        );
                        continue;
                    }
                    return Err(anyhow!(
                        "Gemini request failed with status {}: {}",
                        status,
                        error_text
                    ));
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Gemini request error (attempt {}/{}): {}",
                        attempt, self.max_retries, e
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn extract_text(response: &Value) -> Result<String> {
        response["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow!("Failed to extract generated text from Gemini response"))
    }

    fn extract_usage(response: &Value) -> Usage {
        Usage {
            prompt_tokens: response["usageMetadata"]["promptTokenCount"]
                .as_u64()
                .unwrap_or(0) as u32,
            completion_tokens: response["usageMetadata"]["candidatesTokenCount"]
                .as_u64()
                .unwrap_or(0) as u32,
            total_tokens: response["usageMetadata"]["totalTokenCount"]
                .as_u64()
                .unwrap_or(0) as u32,
        }
    }
}

#[async_trait]
impl ChatModel for GoogleGeminiEngine {
    async fn execute(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_body(request);
        debug!("Google Gemini request: {:?}", body);

        let response = self.send_request(&body).await?;
        let content = Self::extract_text(&response)?;
        let finish_reason = response["candidates"][0]["finishReason"]
            .as_str()
            .map(String::from);

        Ok(ChatResponse {
            content,
            usage: Self::extract_usage(&response),
            model: self.model.clone(),
            finish_reason,
        })
    }

    async fn execute_structured(&self, request: &ChatRequest, schema: &Value) -> Result<Value> {
        let mut body = self.build_body(request);
        body["generationConfig"]["responseMimeType"] = json!("application/json");
        body["generationConfig"]["responseSchema"] = schema.clone();
        debug!("Google Gemini structured request: {:?}", body);

        let response = self.send_request(&body).await?;
        let content = Self::extract_text(&response)?;
        serde_json::from_str(&content)
            .map_err(|e| anyhow!("Gemini structured output is not valid JSON: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> GoogleGeminiEngine {
        GoogleGeminiEngine::new(&LlmConfig {
            model: "gemini-1.5-pro-latest".to_string(),
            api_key: "key".to_string(),
            temperature: Some(0.2),
            max_retries: 0,
        })
        .expect("engine constructs")
    }

    #[test]
    fn stop_sequences_are_forwarded() {
        let request = ChatRequest {
            system: "sys".to_string(),
            user: "user".to_string(),
            stop: vec!["\nCypherResult:".to_string()],
        };
        let body = engine().build_body(&request);
        assert_eq!(
            body["generationConfig"]["stopSequences"],
            json!(["\nCypherResult:"])
        );
    }

    #[test]
    fn empty_stop_list_is_omitted() {
        let request = ChatRequest::default();
        let body = engine().build_body(&request);
        assert!(body["generationConfig"].get("stopSequences").is_none());
    }
}
