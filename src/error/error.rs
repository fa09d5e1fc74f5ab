//! Error types for ToolRelay
//!
//! Three layers live here:
//! - [`RelayError`]: crate-level failures (config, registry, LLM, IO). Only
//!   startup config loading is allowed to turn one of these into a process exit.
//! - [`TransportError`]: what a tool-server transport reports back to the
//!   supervisor. The split between `Refused` and `Remote` decides retryability.
//! - [`ErrorKind`] / [`ToolError`]: the structured outcome carried on an
//!   `ExecutionResult`. Nothing past the dispatch router sees a raw error.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for ToolRelay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type for ToolRelay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Registry / catalog errors
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// Connection errors (tool-server transports)
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Validation errors (schemas, descriptors)
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// LLM provider errors
    #[error("LLM provider error: {message}")]
    Llm { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a registry error
    pub fn registry<S: Into<String>>(message: S) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an LLM provider error
    pub fn llm<S: Into<String>>(message: S) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::Config { .. } => "config",
            RelayError::Registry { .. } => "registry",
            RelayError::Connection { .. } => "connection",
            RelayError::Validation { .. } => "validation",
            RelayError::Llm { .. } => "llm",
            RelayError::Io(_) => "io",
            RelayError::Serde(_) => "serialization",
            RelayError::Yaml(_) => "yaml",
            RelayError::Http(_) => "http",
            RelayError::Internal(_) => "internal",
        }
    }
}

/// Failure reported by a tool-server transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never reached the server (connect refused, DNS, dead pipe).
    /// No remote side effect can have happened, so this is safe to retry.
    #[error("connection refused: {0}")]
    Refused(String),

    /// The server answered with an application-level error
    #[error("remote error: {0}")]
    Remote(String),

    /// The server answered with something we could not interpret
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Only failures that happened before the request left this process are retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Refused(_))
    }
}

impl From<TransportError> for RelayError {
    fn from(err: TransportError) -> Self {
        RelayError::connection(err.to_string())
    }
}

/// Outcome taxonomy carried on a failed `ExecutionResult`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown server or function name
    NotFound,
    /// Identity lacks the function class on that server
    PermissionDenied,
    /// Connection could not be established or re-established
    Unavailable,
    /// Call exceeded the server timeout
    Timeout,
    /// Parameters failed the schema or the destructive-keyword guard
    ValidationError,
    /// The tool server returned an application-level failure
    RemoteError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Unavailable => "server unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ValidationError => "validation error",
            ErrorKind::RemoteError => "remote error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure attached to an `ExecutionResult`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Error class
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl ToolError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_canonical_strings() {
        assert_eq!(ErrorKind::NotFound.to_string(), "not found");
        assert_eq!(ErrorKind::PermissionDenied.to_string(), "permission denied");
        assert_eq!(ErrorKind::Unavailable.to_string(), "server unavailable");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_only_refused_is_retryable() {
        assert!(TransportError::Refused("econnrefused".into()).is_retryable());
        assert!(!TransportError::Remote("rejected".into()).is_retryable());
        assert!(!TransportError::Protocol("bad json".into()).is_retryable());
    }

    #[test]
    fn test_category() {
        assert_eq!(RelayError::config("x").category(), "config");
        assert_eq!(RelayError::llm("x").category(), "llm");
        let converted: RelayError = TransportError::Refused("down".into()).into();
        assert_eq!(converted.category(), "connection");
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::new(ErrorKind::ValidationError, "missing field 'query'");
        assert_eq!(err.to_string(), "validation error: missing field 'query'");
        assert_eq!(ToolError::new(ErrorKind::Timeout, "").to_string(), "timeout");
    }
}
