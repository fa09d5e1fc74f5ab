//! OpenAI-style chat completions with function calling

use crate::config::LlmConfig;
use crate::error::{RelayError, Result};
use crate::llm::schema::to_openai_function;
use crate::llm::types::{ChatMessage, Completion, CompletionRequest, LlmProvider};
use crate::llm::DEFAULT_MAX_TOKENS;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat completions client
pub struct OpenAiProvider {
    model: String,
    api_key: Secret<String>,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    http_client: Client,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| RelayError::config("OpenAI provider requires llm.api_key"))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RelayError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: config.temperature,
            http_client,
        })
    }

    fn render_messages(request: &CompletionRequest) -> Vec<Value> {
        let mut messages = Vec::new();

        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }

        for message in &request.messages {
            messages.push(match message {
                ChatMessage::User { content } => json!({"role": "user", "content": content}),
                ChatMessage::Assistant { content } => json!({"role": "assistant", "content": content}),
                ChatMessage::FunctionCall { id, name, arguments } => json!({
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": id,
                        "type": "function",
                        "function": {"name": name, "arguments": arguments.to_string()}
                    }]
                }),
                ChatMessage::FunctionResult { id, content, .. } => json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": content
                }),
            });
        }

        messages
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": Self::render_messages(request),
            "max_tokens": self.max_tokens,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(to_openai_function).collect());
            body["tool_choice"] = json!("auto");
        }
        body
    }

    fn parse_response(response: &Value) -> Result<Completion> {
        let message = response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| RelayError::llm("OpenAI response has no choices"))?;

        if let Some(call) = message
            .get("tool_calls")
            .and_then(|calls| calls.as_array())
            .and_then(|calls| calls.first())
        {
            let id = call.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let function = call
                .get("function")
                .ok_or_else(|| RelayError::llm("OpenAI tool call without function"))?;
            let name = function
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| RelayError::llm("OpenAI tool call without name"))?
                .to_string();
            // arguments arrive as a JSON-encoded string
            let arguments = match function.get("arguments") {
                Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
                Some(Value::String(raw)) => serde_json::from_str(raw)
                    .map_err(|e| RelayError::llm(format!("OpenAI tool call arguments are not JSON: {}", e)))?,
                Some(other) => other.clone(),
                None => json!({}),
            };
            return Ok(Completion::FunctionCall { id, name, arguments });
        }

        let text = message
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(Completion::Text(text))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        debug!(
            "🤖 [LLM] OpenAI request: model={}, messages={}, tools={}",
            self.model,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| RelayError::llm(format!("OpenAI API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RelayError::llm(format!("OpenAI API error ({}): {}", status, error_text)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RelayError::llm(format!("Failed to parse OpenAI response: {}", e)))?;

        Self::parse_response(&body)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
