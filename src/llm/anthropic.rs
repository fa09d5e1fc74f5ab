//! Anthropic-style messages API with tool use

use crate::config::LlmConfig;
use crate::error::{RelayError, Result};
use crate::llm::schema::to_anthropic_tool;
use crate::llm::types::{ChatMessage, Completion, CompletionRequest, LlmProvider};
use crate::llm::DEFAULT_MAX_TOKENS;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic messages client
pub struct AnthropicProvider {
    model: String,
    api_key: Secret<String>,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    http_client: Client,
}

impl AnthropicProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| RelayError::config("Anthropic provider requires llm.api_key"))?;

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

    // System text goes in its own field, not in the message list
    fn render_messages(request: &CompletionRequest) -> Vec<Value> {
        request
            .messages
            .iter()
            .map(|message| match message {
                ChatMessage::User { content } => json!({"role": "user", "content": content}),
                ChatMessage::Assistant { content } => json!({"role": "assistant", "content": content}),
                ChatMessage::FunctionCall { id, name, arguments } => json!({
                    "role": "assistant",
                    "content": [{"type": "tool_use", "id": id, "name": name, "input": arguments}]
                }),
                ChatMessage::FunctionResult { id, content, .. } => json!({
                    "role": "user",
                    "content": [{"type": "tool_result", "tool_use_id": id, "content": content}]
                }),
            })
            .collect()
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": Self::render_messages(request),
            "max_tokens": self.max_tokens,
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(to_anthropic_tool).collect());
        }
        body
    }

    fn parse_response(response: &Value) -> Result<Completion> {
        let blocks = response
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| RelayError::llm("Anthropic response has no content"))?;

        let tool_use = blocks
            .iter()
            .find(|block| block.get("type").and_then(|t| t.as_str()) == Some("tool_use"));
        if let Some(block) = tool_use {
            let id = block.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let name = block
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| RelayError::llm("Anthropic tool_use block without name"))?
                .to_string();
            let arguments = block.get("input").cloned().unwrap_or_else(|| json!({}));
            return Ok(Completion::FunctionCall { id, name, arguments });
        }

        let text = blocks
            .iter()
            .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Completion::Text(text))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        debug!(
            "🤖 [LLM] Anthropic request: model={}, messages={}, tools={}",
            self.model,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| RelayError::llm(format!("Anthropic API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RelayError::llm(format!("Anthropic API error ({}): {}", status, error_text)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RelayError::llm(format!("Failed to parse Anthropic response: {}", e)))?;

        Self::parse_response(&body)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_use() {
        let response = json!({
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_1", "name": "docs__search", "input": {"library": "tokio"}}
            ],
            "stop_reason": "tool_use"
        });
        assert_eq!(
            AnthropicProvider::parse_response(&response).unwrap(),
            Completion::FunctionCall {
                id: "toolu_1".to_string(),
                name: "docs__search".to_string(),
                arguments: json!({"library": "tokio"}),
            }
        );
    }

    #[test]
    fn test_parse_joins_text_blocks() {
        let response = json!({"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]});
        assert_eq!(
            AnthropicProvider::parse_response(&response).unwrap(),
            Completion::Text("a\nb".to_string())
        );
    }

    #[test]
    fn test_tool_result_is_user_turn() {
        let request = CompletionRequest::new(
            None,
            vec![ChatMessage::FunctionResult {
                id: "toolu_1".to_string(),
                name: "docs__search".to_string(),
                content: "found".to_string(),
            }],
        );
        let messages = AnthropicProvider::render_messages(&request);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"][0]["type"], "tool_result");
        assert_eq!(messages[0]["content"][0]["tool_use_id"], "toolu_1");
    }
}
