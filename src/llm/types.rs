//! Provider-neutral conversation types and the provider trait

use crate::error::Result;
use crate::registry::FunctionDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User { content: String },
    Assistant { content: String },
    /// A function call the model asked for
    FunctionCall { id: String, name: String, arguments: Value },
    /// The outcome of that call, fed back to the model
    FunctionResult { id: String, name: String, content: String },
}

impl ChatMessage {
    pub fn user<S: Into<String>>(content: S) -> Self {
        ChatMessage::User { content: content.into() }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        ChatMessage::Assistant { content: content.into() }
    }
}

/// A completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Functions offered to the model; empty means plain chat
    pub tools: Vec<FunctionDescriptor>,
}

impl CompletionRequest {
    pub fn new(system: Option<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system,
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<FunctionDescriptor>) -> Self {
        self.tools = tools;
        self
    }
}

/// What the model answered
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    /// Exactly one structured call; `name` is the exposed `server__function` name
    FunctionCall { id: String, name: String, arguments: Value },
}

/// A chat model with function calling
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Provider name for logs
    fn name(&self) -> &str;
}
