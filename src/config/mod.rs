//! Configuration management for ToolRelay

mod config;
mod validator;

pub use config::{
    CommandRouteConfig, Config, FunctionConfig, IdentityConfig, LlmConfig, LoggingConfig,
    ManagerConfig, PermissionsConfig, SecurityConfig, ServerConfig, DEFAULT_CONFIG_PATH,
    SUPPORTED_LLM_PROVIDERS,
};
