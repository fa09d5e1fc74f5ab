//! JSON-RPC 2.0 message types shared by the HTTP and stdio transports

use crate::error::TransportError;
use crate::registry::RemoteFunction;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// JSON-RPC "method not found"
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Protocol version announced during `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Request (or notification, when `id` is absent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID; `None` for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Request with a fresh UUID id
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(Value::String(Uuid::new_v4().to_string())),
            method: method.to_string(),
            params,
        }
    }

    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.to_string(),
            params: None,
        }
    }

    /// `initialize` handshake request
    pub fn initialize() -> Self {
        Self::new(
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                }
            })),
        )
    }

    pub fn list_tools() -> Self {
        Self::new("tools/list", None)
    }

    pub fn call_tool(name: &str, arguments: Value) -> Self {
        Self::new("tools/call", Some(json!({ "name": name, "arguments": arguments })))
    }

    pub fn ping() -> Self {
        Self::new("ping", None)
    }

    /// Correlation key for the id
    pub fn id_key(&self) -> Option<String> {
        self.id.as_ref().map(id_key)
    }
}

/// Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Request ID this responds to
    #[serde(default)]
    pub id: Value,
    /// Result (if successful)
    #[serde(default)]
    pub result: Option<Value>,
    /// Error (if failed)
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// Error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Result payload, or the error mapped onto the transport taxonomy
    pub fn into_result(self) -> Result<Value, TransportError> {
        if let Some(error) = self.error {
            return Err(TransportError::Remote(format!("{} (code {})", error.message, error.code)));
        }
        self.result
            .ok_or_else(|| TransportError::Protocol("response carries neither result nor error".to_string()))
    }

    /// Correlation key for the id
    pub fn id_key(&self) -> String {
        id_key(&self.id)
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a `tools/list` result
pub fn parse_tool_list(result: Value) -> Result<Vec<RemoteFunction>, TransportError> {
    let tools = result
        .get("tools")
        .cloned()
        .ok_or_else(|| TransportError::Protocol("Missing 'tools' field in tools/list response".to_string()))?;
    serde_json::from_value(tools).map_err(|e| TransportError::Protocol(format!("Invalid tools format: {}", e)))
}

/// Interpret a `tools/call` result; `isError: true` is an application failure
pub fn parse_call_result(result: Value) -> Result<Value, TransportError> {
    let is_error = result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false);
    if !is_error {
        return Ok(result);
    }

    let message = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "tool reported an error".to_string());
    Err(TransportError::Remote(message))
}
