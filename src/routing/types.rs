//! Routing result types

use crate::error::{ErrorKind, ToolError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one `execute`. Failures are data, never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether execution was successful
    pub success: bool,
    /// Result payload
    pub data: Option<Value>,
    /// Failure class and detail
    pub error: Option<ToolError>,
    /// Target server
    pub server: String,
    /// Local function name on that server
    pub function: String,
    /// Wall-clock time spent in `execute`
    pub execution_time_ms: u64,
    /// Served from the result cache
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(server: &str, function: &str, data: Value, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            server: server.to_string(),
            function: function.to_string(),
            execution_time_ms,
            cached: false,
            timestamp: Utc::now(),
        }
    }

    pub fn failure<S: Into<String>>(
        server: &str,
        function: &str,
        kind: ErrorKind,
        message: S,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolError::new(kind, message)),
            server: server.to_string(),
            function: function.to_string(),
            execution_time_ms,
            cached: false,
            timestamp: Utc::now(),
        }
    }

    /// Mark as served from cache
    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// "server__function"
    pub fn qualified_name(&self) -> String {
        crate::registry::qualified_name(&self.server, &self.function)
    }
}
