//! Core types for the server registry and function catalog

use crate::config::{FunctionConfig, ServerConfig};
use crate::error::{RelayError, Result};
use jsonschema::JSONSchema;
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Separator between server and function in an exposed function name
pub const NAME_SEPARATOR: &str = "__";

/// Build the exposed name `"{server}__{function}"`
pub fn qualified_name(server: &str, function: &str) -> String {
    format!("{}{}{}", server, NAME_SEPARATOR, function)
}

/// Split an exposed name at the first separator.
///
/// Server names never contain the separator, so everything after the first
/// occurrence belongs to the function name.
pub fn split_qualified_name(name: &str) -> Option<(&str, &str)> {
    let (server, function) = name.split_once(NAME_SEPARATOR)?;
    if server.is_empty() || function.is_empty() {
        return None;
    }
    Some((server, function))
}

/// Coarse capability tag used by the permission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionClass {
    Read,
    Write,
    Admin,
    Search,
}

impl FunctionClass {
    pub const ALL: [FunctionClass; 4] = [
        FunctionClass::Read,
        FunctionClass::Write,
        FunctionClass::Admin,
        FunctionClass::Search,
    ];

    /// Write and admin functions have side effects and are never cached
    pub fn allows_caching(&self) -> bool {
        matches!(self, FunctionClass::Read | FunctionClass::Search)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionClass::Read => "read",
            FunctionClass::Write => "write",
            FunctionClass::Admin => "admin",
            FunctionClass::Search => "search",
        }
    }
}

impl fmt::Display for FunctionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionClass {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(FunctionClass::Read),
            "write" => Ok(FunctionClass::Write),
            "admin" => Ok(FunctionClass::Admin),
            "search" => Ok(FunctionClass::Search),
            other => Err(RelayError::validation(format!("Unknown function class '{}'", other))),
        }
    }
}

/// How a server is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// JSON-RPC over HTTP POST
    Http,
    /// JSON-RPC over a spawned process' stdin/stdout
    Stdio,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => f.write_str("http"),
            TransportKind::Stdio => f.write_str("stdio"),
        }
    }
}

/// Immutable description of one tool server, built from configuration
#[derive(Debug, Clone)]
pub struct ServerDescriptor {
    /// Unique key
    pub name: String,
    /// Name for humans
    pub display_name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Always true for descriptors inside a registry
    pub enabled: bool,
    /// Transport used to reach the server
    pub transport: TransportKind,
    /// HTTP endpoint
    pub endpoint: Option<String>,
    /// Bearer credential
    pub api_key: Option<Secret<String>>,
    /// Stdio command
    pub command: Option<String>,
    /// Stdio arguments
    pub args: Vec<String>,
    /// Stdio environment
    pub env: HashMap<String, String>,
    /// Hard per-call deadline
    pub timeout: Duration,
    /// Extra attempts for refused calls
    pub retry_budget: u32,
    /// Lifetime of cached results
    pub cache_ttl: Duration,
    /// Ceiling on grantable classes; empty means no ceiling
    pub permission_tags: HashSet<FunctionClass>,
    /// Explicit per-function metadata from config
    pub function_overrides: HashMap<String, FunctionConfig>,
}

impl ServerDescriptor {
    pub fn from_config(config: &ServerConfig) -> Self {
        let transport = if config.command.is_some() {
            TransportKind::Stdio
        } else {
            TransportKind::Http
        };

        Self {
            name: config.name.clone(),
            display_name: config.display_name.clone().unwrap_or_else(|| config.name.clone()),
            description: config.description.clone(),
            enabled: config.enabled,
            transport,
            endpoint: config.api_url.clone(),
            api_key: config.api_key.clone(),
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            timeout: Duration::from_secs(config.timeout),
            retry_budget: config.retry_budget,
            cache_ttl: Duration::from_secs(config.cache_ttl),
            permission_tags: config.permissions.iter().copied().collect(),
            function_overrides: config
                .functions
                .iter()
                .map(|f| (f.name.clone(), f.clone()))
                .collect(),
        }
    }

    /// Whether this server's tags allow a class to be granted at all
    pub fn permits_class(&self, class: FunctionClass) -> bool {
        self.permission_tags.is_empty() || self.permission_tags.contains(&class)
    }
}

/// A function as reported by a server's listing call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFunction {
    /// Local function name
    pub name: String,
    /// Description, if the server provides one
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema of the arguments
    #[serde(default)]
    pub input_schema: Value,
    /// Capability class, if the server reports one
    #[serde(default)]
    pub function_class: Option<FunctionClass>,
    /// Cacheability, if the server reports it
    #[serde(default)]
    pub cacheable: Option<bool>,
    /// Query-text parameter, if the server reports one
    #[serde(default)]
    pub query_parameter: Option<String>,
}

impl RemoteFunction {
    pub fn new<S: Into<String>>(name: S, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
            function_class: None,
            cacheable: None,
            query_parameter: None,
        }
    }

    pub fn with_class(mut self, class: FunctionClass, cacheable: bool) -> Self {
        self.function_class = Some(class);
        self.cacheable = Some(cacheable);
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_query_parameter<S: Into<String>>(mut self, parameter: S) -> Self {
        self.query_parameter = Some(parameter.into());
        self
    }
}

/// A callable function of a connected server
#[derive(Clone)]
pub struct FunctionDescriptor {
    /// Local function name
    pub name: String,
    /// Owning server
    pub server: String,
    /// Description used in help text and LLM schemas
    pub description: String,
    /// JSON schema object for the arguments
    pub parameter_schema: Value,
    /// Capability class
    pub class: FunctionClass,
    /// Whether results may be cached
    pub cacheable: bool,
    /// Parameter carrying free-form query text, checked by the keyword guard
    pub query_parameter: Option<String>,
    validator: Arc<JSONSchema>,
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("server", &self.server)
            .field("class", &self.class)
            .field("cacheable", &self.cacheable)
            .field("query_parameter", &self.query_parameter)
            .finish()
    }
}

impl FunctionDescriptor {
    /// Create a descriptor.
    ///
    /// Fails when a write/admin function is marked cacheable or when the
    /// schema does not compile.
    pub fn new(
        server: &str,
        name: &str,
        description: Option<String>,
        parameter_schema: Value,
        class: FunctionClass,
        cacheable: bool,
        query_parameter: Option<String>,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(RelayError::validation(format!("Server '{}' listed a function without a name", server)));
        }
        if cacheable && !class.allows_caching() {
            return Err(RelayError::validation(format!(
                "Function '{}' is {} class and cannot be cacheable",
                qualified_name(server, name),
                class
            )));
        }

        let parameter_schema = if parameter_schema.is_null() {
            json!({"type": "object", "properties": {}})
        } else {
            parameter_schema
        };
        if !parameter_schema.is_object() {
            return Err(RelayError::validation(format!(
                "Function '{}' has a non-object parameter schema",
                qualified_name(server, name)
            )));
        }

        let validator = JSONSchema::compile(&parameter_schema).map_err(|e| {
            RelayError::validation(format!(
                "Function '{}' has an invalid parameter schema: {}",
                qualified_name(server, name),
                e
            ))
        })?;

        Ok(Self {
            name: name.to_string(),
            server: server.to_string(),
            description: description.unwrap_or_else(|| format!("Function: {}", name)),
            parameter_schema,
            class,
            cacheable,
            query_parameter,
            validator: Arc::new(validator),
        })
    }

    /// Exposed `"{server}__{name}"` name
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.server, &self.name)
    }

    /// Validate call arguments against the parameter schema
    pub fn validate_arguments(&self, arguments: &Value) -> std::result::Result<(), String> {
        if let Err(errors) = self.validator.validate(arguments) {
            let messages: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();
            return Err(messages.join("; "));
        }
        Ok(())
    }

    /// Required parameter names, in schema order
    pub fn required_parameters(&self) -> Vec<String> {
        self.parameter_schema
            .get("required")
            .and_then(|v| v.as_array())
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
