//! Configuration validation
//!
//! Anything rejected here stops startup (or a reload). Entries that are merely
//! unusable, like a disabled server or one without credentials, are not errors:
//! the registry skips them with a warning.

use super::config::{Config, SUPPORTED_LLM_PROVIDERS};
use crate::error::{RelayError, Result};
use crate::registry::NAME_SEPARATOR;
use std::collections::HashSet;

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_manager()?;
        self.validate_servers()?;
        self.validate_permissions()?;
        self.validate_llm()?;
        self.validate_commands()?;
        Ok(())
    }

    fn validate_manager(&self) -> Result<()> {
        if self.manager.cache_max_size == 0 {
            return Err(RelayError::config("manager.cache_max_size must be greater than 0"));
        }
        if self.manager.health_check_timeout == 0 {
            return Err(RelayError::config("manager.health_check_timeout must be greater than 0"));
        }
        if self.manager.max_consecutive_failures == 0 {
            return Err(RelayError::config("manager.max_consecutive_failures must be greater than 0"));
        }
        if self.manager.retry_delay_ms > self.manager.max_retry_delay_ms {
            return Err(RelayError::config(
                "manager.retry_delay_ms cannot exceed manager.max_retry_delay_ms",
            ));
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(RelayError::config(format!(
                "logging.format must be 'text' or 'json', got '{}'",
                other
            ))),
        }
    }

    fn validate_servers(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for (index, server) in self.servers.iter().enumerate() {
            if server.name.trim().is_empty() {
                return Err(RelayError::config(format!("servers[{}]: name cannot be empty", index)));
            }
            if server.name.contains(NAME_SEPARATOR) {
                return Err(RelayError::config(format!(
                    "Server '{}': name cannot contain '{}'",
                    server.name, NAME_SEPARATOR
                )));
            }
            if !seen.insert(server.name.as_str()) {
                return Err(RelayError::config(format!("Duplicate server name '{}'", server.name)));
            }
            if server.timeout == 0 {
                return Err(RelayError::config(format!(
                    "Server '{}': timeout must be greater than 0",
                    server.name
                )));
            }
            if let Some(url) = &server.api_url {
                url::Url::parse(url).map_err(|e| {
                    RelayError::config(format!("Server '{}': invalid api_url '{}': {}", server.name, url, e))
                })?;
            }

            let mut function_names = HashSet::new();
            for function in &server.functions {
                if !function_names.insert(function.name.as_str()) {
                    return Err(RelayError::config(format!(
                        "Server '{}': function '{}' is listed twice",
                        server.name, function.name
                    )));
                }
            }
        }

        Ok(())
    }

    fn validate_permissions(&self) -> Result<()> {
        for identity in &self.permissions.identities {
            if identity.id.is_none() && identity.username.is_none() {
                return Err(RelayError::config(format!(
                    "Identity with role '{}' needs an id or a username",
                    identity.role
                )));
            }
            if !self.permissions.roles.contains_key(&identity.role) {
                return Err(RelayError::config(format!(
                    "Identity references unknown role '{}'",
                    identity.role
                )));
            }
        }
        Ok(())
    }

    fn validate_llm(&self) -> Result<()> {
        if let Some(llm) = &self.llm {
            if !SUPPORTED_LLM_PROVIDERS.contains(&llm.provider.as_str()) {
                return Err(RelayError::config(format!(
                    "Unsupported LLM provider '{}'. Must be one of: {}",
                    llm.provider,
                    SUPPORTED_LLM_PROVIDERS.join(", ")
                )));
            }
            if llm.model.trim().is_empty() {
                return Err(RelayError::config("llm.model cannot be empty"));
            }
        }
        Ok(())
    }

    fn validate_commands(&self) -> Result<()> {
        let mut prefixes = HashSet::new();
        for route in &self.commands {
            if !route.prefix.starts_with('/') || route.prefix.len() < 2 {
                return Err(RelayError::config(format!(
                    "Command prefix '{}' must start with '/'",
                    route.prefix
                )));
            }
            if route.prefix.chars().any(char::is_whitespace) {
                return Err(RelayError::config(format!(
                    "Command prefix '{}' cannot contain whitespace",
                    route.prefix
                )));
            }
            if !prefixes.insert(route.prefix.as_str()) {
                return Err(RelayError::config(format!("Duplicate command prefix '{}'", route.prefix)));
            }
            if !route.function.contains(NAME_SEPARATOR) {
                return Err(RelayError::config(format!(
                    "Command '{}' must target a qualified function name (server{}function)",
                    route.prefix, NAME_SEPARATOR
                )));
            }
        }
        Ok(())
    }
}
