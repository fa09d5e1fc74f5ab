//! ToolRelay - permissioned orchestration of remote tool servers
//!
//! Keeps a registry of tool servers, supervises their connections, exposes
//! their functions to an LLM through function calling and routes the chosen
//! calls through a permission gate, a result cache and metrics.

pub mod config;
pub mod discovery;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod metrics;
pub mod registry;
pub mod routing;
pub mod security;
pub mod services;
pub mod startup;

pub use config::Config;
pub use error::{ErrorKind, RelayError, Result, ToolError};
pub use routing::ExecutionResult;
pub use security::Identity;
pub use services::Orchestrator;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
