//! Configuration types and loading for ToolRelay

use crate::error::{RelayError, Result};
use crate::registry::FunctionClass;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "toolrelay.yaml";

/// LLM providers the bridge knows how to talk to
pub const SUPPORTED_LLM_PROVIDERS: &[&str] = &["openai", "anthropic"];

/// Serde helper for optional secrets; secrets are never serialized back out
mod option_secret_string {
    use secrecy::Secret;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_s = Option::<String>::deserialize(deserializer)?;
        Ok(opt_s.filter(|s| !s.is_empty()).map(Secret::new))
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Connection supervisor, cache and retry tuning
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Tool server entries
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    /// Role and identity tables
    #[serde(default)]
    pub permissions: PermissionsConfig,
    /// Guard policy applied before dispatch
    #[serde(default)]
    pub security: SecurityConfig,
    /// LLM provider for free-text requests (optional)
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    /// Slash-command routes
    #[serde(default)]
    pub commands: Vec<CommandRouteConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Supervisor, cache and retry tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Seconds between background health checks (0 disables the timer)
    pub health_check_interval: u64,
    /// Timeout for a single health probe, in seconds
    pub health_check_timeout: u64,
    /// A connection not probed for this many seconds is probed before the next call
    pub stale_after: u64,
    /// A connection with more errors than this is probed before the next call
    pub error_threshold: u32,
    /// Failed probes in a row before a server is marked as errored
    pub max_consecutive_failures: u32,
    /// Maximum number of cached results
    pub cache_max_size: usize,
    /// Base delay between retries of refused calls, in milliseconds
    pub retry_delay_ms: u64,
    /// Upper bound on the retry delay, in milliseconds
    pub max_retry_delay_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            health_check_interval: 60,
            health_check_timeout: 10,
            stale_after: 300,
            error_threshold: 5,
            max_consecutive_failures: 3,
            cache_max_size: 1000,
            retry_delay_ms: 200,
            max_retry_delay_ms: 2000,
        }
    }
}

/// One tool server entry
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Unique server name, used as the function-name prefix
    pub name: String,
    /// Human-friendly name for status output
    #[serde(default)]
    pub display_name: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Disabled servers never enter the registry
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// JSON-RPC endpoint for HTTP servers
    #[serde(default)]
    pub api_url: Option<String>,
    /// Bearer credential for HTTP servers
    #[serde(default, deserialize_with = "option_secret_string::deserialize")]
    pub api_key: Option<Secret<String>>,
    /// Command to spawn for stdio servers
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments for `command`
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment for `command`
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Whether `api_key` must be present (defaults to true for HTTP servers)
    #[serde(default)]
    pub require_api_key: Option<bool>,
    /// Function classes this server may ever grant
    #[serde(default)]
    pub permissions: Vec<FunctionClass>,
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Extra attempts allowed for calls refused before reaching the server
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Lifetime of cached results in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// Explicit function metadata; wins over what the server reports
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_retry_budget() -> u32 {
    3
}

fn default_cache_ttl() -> u64 {
    300
}

impl ServerConfig {
    /// Minimal entry with defaults, handy for tests and programmatic setups
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            enabled: true,
            api_url: None,
            api_key: None,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            require_api_key: Some(false),
            permissions: Vec::new(),
            timeout: default_timeout(),
            retry_budget: default_retry_budget(),
            cache_ttl: default_cache_ttl(),
            functions: Vec::new(),
        }
    }

    /// Stdio servers run locally and need no credential unless asked to
    pub fn requires_api_key(&self) -> bool {
        self.require_api_key.unwrap_or(self.command.is_none())
    }

    /// Whether the configured credentials satisfy this entry
    pub fn has_credentials(&self) -> bool {
        if !self.requires_api_key() {
            return true;
        }
        self.api_key
            .as_ref()
            .map(|key| !key.expose_secret().trim().is_empty())
            .unwrap_or(false)
    }

    /// Whether there is any way to reach this server
    pub fn has_endpoint(&self) -> bool {
        self.command.is_some() || self.api_url.is_some()
    }
}

/// Explicit metadata for one function of a server
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionConfig {
    /// Local function name
    pub name: String,
    /// Capability class used by the permission gate
    #[serde(default)]
    pub class: Option<FunctionClass>,
    /// Whether results may be cached
    #[serde(default)]
    pub cacheable: Option<bool>,
    /// Parameter that carries free-form query text for the keyword guard
    #[serde(default)]
    pub query_parameter: Option<String>,
    /// Description override
    #[serde(default)]
    pub description: Option<String>,
    /// Parameter schema override
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Role and identity tables for the permission gate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionsConfig {
    /// role -> (server name or "*") -> granted classes
    #[serde(default)]
    pub roles: HashMap<String, HashMap<String, Vec<FunctionClass>>>,
    /// Known privileged identities
    #[serde(default)]
    pub identities: Vec<IdentityConfig>,
}

/// One privileged identity
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Stable user id
    #[serde(default)]
    pub id: Option<String>,
    /// Username, matched case-insensitively without a leading '@'
    #[serde(default)]
    pub username: Option<String>,
    /// Role name from `roles`
    pub role: String,
}

/// Guard policy
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Words rejected inside query parameters
    #[serde(default = "default_destructive_keywords")]
    pub destructive_keywords: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            destructive_keywords: default_destructive_keywords(),
        }
    }
}

fn default_destructive_keywords() -> Vec<String> {
    ["DROP", "TRUNCATE", "DELETE", "ALTER", "GRANT", "REVOKE"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// "openai" or "anthropic"
    pub provider: String,
    /// Model identifier sent to the provider
    pub model: String,
    /// API key
    #[serde(default, deserialize_with = "option_secret_string::deserialize")]
    pub api_key: Option<Secret<String>>,
    /// Base URL override (proxies, self-hosted gateways, tests)
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Completion token limit
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// System prompt prepended to every conversation
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Slash-command route
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRouteConfig {
    /// Leading token, e.g. "/db"
    pub prefix: String,
    /// Qualified function name, e.g. "data__execute"
    pub function: String,
    /// Positional argument names; the last one absorbs the rest of the line
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Arguments added to every call
    #[serde(default)]
    pub fixed_arguments: Map<String, Value>,
    /// Help text
    #[serde(default)]
    pub description: Option<String>,
}

impl Config {
    /// Load .env files in order of precedence: .env → .env.{environment} → .env.local
    fn load_env_files() {
        let env = std::env::var("TOOLRELAY_ENV").unwrap_or_else(|_| "development".to_string());

        let env_specific_file = format!(".env.{}", env);
        let env_files = [".env", env_specific_file.as_str(), ".env.local"];

        for env_file in env_files {
            match dotenvy::from_filename(env_file) {
                Ok(_) => {
                    info!("Loaded environment variables from {}", env_file);
                }
                Err(e) if e.not_found() => {
                    debug!("No {} file found, skipping", env_file);
                }
                Err(e) => {
                    warn!("Failed to load {}: {}", env_file, e);
                }
            }
        }
    }

    /// Load configuration from file with environment variables and CLI overrides
    pub fn load<P: AsRef<Path>>(path: P, log_level_override: Option<String>) -> Result<Self> {
        Self::load_env_files();

        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_yaml(&content)?;

        // Precedence: .env < file < env < CLI
        config.apply_environment_overrides()?;

        if let Some(level) = log_level_override {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse YAML and resolve `${VAR}` references. Does not validate.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(content)
            .map_err(|e| RelayError::config(format!("Failed to parse config file: {}", e)))?;
        config.expand_references();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(level) = get("TOOLRELAY_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(interval) = get("TOOLRELAY_HEALTH_INTERVAL") {
            self.manager.health_check_interval = interval.parse().map_err(|e| {
                RelayError::config(format!("Invalid TOOLRELAY_HEALTH_INTERVAL environment variable: {}", e))
            })?;
        }

        if let Some(size) = get("TOOLRELAY_CACHE_MAX_SIZE") {
            self.manager.cache_max_size = size.parse().map_err(|e| {
                RelayError::config(format!("Invalid TOOLRELAY_CACHE_MAX_SIZE environment variable: {}", e))
            })?;
        }

        let provider = get("TOOLRELAY_LLM_PROVIDER");
        let model = get("TOOLRELAY_LLM_MODEL");
        match (&mut self.llm, provider, model) {
            (Some(llm), provider, model) => {
                if let Some(provider) = provider {
                    llm.provider = provider;
                }
                if let Some(model) = model {
                    llm.model = model;
                }
            }
            (None, Some(provider), Some(model)) => {
                self.llm = Some(LlmConfig {
                    provider,
                    model,
                    api_key: None,
                    api_base_url: None,
                    max_tokens: None,
                    temperature: None,
                    system_prompt: None,
                });
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                warn!("TOOLRELAY_LLM_PROVIDER and TOOLRELAY_LLM_MODEL must both be set when the config has no llm section");
            }
            (None, None, None) => {}
        }

        Ok(())
    }

    /// Resolve `${VAR}` references in endpoints, commands and credentials
    fn expand_references(&mut self) {
        for server in &mut self.servers {
            server.api_url = server.api_url.take().map(|url| expand_lossy(&url));
            server.command = server.command.take().map(|cmd| expand_lossy(&cmd));
            server.args = server.args.iter().map(|arg| expand_lossy(arg)).collect();
            server.env = server
                .env
                .iter()
                .map(|(k, v)| (k.clone(), expand_lossy(v)))
                .collect();
            if let Some(key) = server.api_key.take() {
                server.api_key = expand_secret(&server.name, key);
            }
        }

        if let Some(llm) = &mut self.llm {
            llm.api_base_url = llm.api_base_url.take().map(|url| expand_lossy(&url));
            if let Some(key) = llm.api_key.take() {
                llm.api_key = expand_secret("llm", key);
            }
        }
    }
}

/// Expand `${VAR}`, leaving unresolved references untouched
fn expand_lossy(input: &str) -> String {
    match shellexpand::env(input) {
        Ok(expanded) => expanded.into_owned(),
        Err(e) => {
            warn!("Unresolved environment reference '{}' in config: {}", e.var_name, input);
            input.to_string()
        }
    }
}

/// Expand a credential; an unresolved reference means the credential is missing
fn expand_secret(owner: &str, secret: Secret<String>) -> Option<Secret<String>> {
    match shellexpand::env(secret.expose_secret()) {
        Ok(expanded) if !expanded.trim().is_empty() => Some(Secret::new(expanded.into_owned())),
        Ok(_) => None,
        Err(e) => {
            warn!("Credential for '{}' references unset variable '{}'", owner, e.var_name);
            None
        }
    }
}
