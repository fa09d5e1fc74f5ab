//! LLM providers with function calling

pub mod anthropic;
pub mod openai;
pub mod schema;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use schema::{to_anthropic_tool, to_openai_function};
pub use types::{ChatMessage, Completion, CompletionRequest, LlmProvider};

use crate::config::LlmConfig;
use crate::error::{RelayError, Result};
use std::sync::Arc;
use tracing::info;

/// Completion token limit when the config sets none
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Build the configured provider
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "openai" => Arc::new(OpenAiProvider::new(config)?),
        "anthropic" => Arc::new(AnthropicProvider::new(config)?),
        other => return Err(RelayError::config(format!("Unsupported LLM provider: {}", other))),
    };
    info!("🤖 [LLM] Using provider '{}' with model '{}'", provider.name(), config.model);
    Ok(provider)
}
