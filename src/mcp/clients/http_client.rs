//! HTTP transport
//!
//! JSON-RPC 2.0 over HTTP POST to a tool server's endpoint, authenticated with
//! a bearer token when the server has an API key.

use crate::error::{RelayError, Result, TransportError};
use crate::mcp::jsonrpc::{parse_call_result, parse_tool_list, JsonRpcRequest, JsonRpcResponse};
use crate::mcp::transport::ToolTransport;
use crate::registry::{RemoteFunction, ServerDescriptor, TransportKind};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// JSON-RPC over HTTP
pub struct HttpTransport {
    /// Server name, for logs
    service_id: String,
    /// Endpoint
    base_url: Url,
    /// Bearer credential
    api_key: Option<Secret<String>>,
    /// Pooled HTTP client
    http_client: Client,
}

impl HttpTransport {
    pub fn new(server: &ServerDescriptor) -> Result<Self> {
        let endpoint = server.endpoint.as_deref().ok_or_else(|| {
            RelayError::config(format!("Server '{}' has no api_url for the HTTP transport", server.name))
        })?;
        let base_url = Url::parse(endpoint)
            .map_err(|e| RelayError::validation(format!("Invalid base URL '{}': {}", endpoint, e)))?;

        // No overall timeout here: the dispatch router owns the call deadline.
        let http_client = Client::builder()
            .connect_timeout(server.timeout)
            .pool_max_idle_per_host(10)
            .user_agent(concat!("ToolRelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            service_id: server.name.clone(),
            base_url,
            api_key: server.api_key.clone(),
            http_client,
        })
    }

    fn add_authentication(&self, req_builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req_builder.bearer_auth(key.expose_secret()),
            None => req_builder,
        }
    }

    async fn send_request(&self, request: &JsonRpcRequest) -> std::result::Result<JsonRpcResponse, TransportError> {
        debug!(
            "Sending HTTP request to {}: method={}, id={:?}",
            self.service_id, request.method, request.id
        );

        let req_builder = self
            .http_client
            .post(self.base_url.clone())
            .header("Content-Type", "application/json")
            .json(request);

        let response = self
            .add_authentication(req_builder)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TransportError::Refused(format!("{}: {}", self.service_id, e))
                } else {
                    TransportError::Protocol(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("HTTP {} from {}: {}", status, self.service_id, error_text);
            return Err(if status.is_client_error() {
                TransportError::Remote(message)
            } else {
                TransportError::Protocol(message)
            });
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| TransportError::Protocol(format!("Failed to read response body: {}", e)))?;

        let rpc_response: JsonRpcResponse = serde_json::from_str(&response_text)
            .map_err(|e| TransportError::Protocol(format!("Invalid JSON-RPC response: {}", e)))?;

        debug!(
            "Received HTTP response from {}: id={}, success={}",
            self.service_id,
            rpc_response.id_key(),
            rpc_response.error.is_none()
        );

        Ok(rpc_response)
    }
}

#[async_trait]
impl ToolTransport for HttpTransport {
    async fn connect(&self) -> std::result::Result<(), TransportError> {
        // Any JSON-RPC answer proves the endpoint is up, even an error object.
        self.send_request(&JsonRpcRequest::initialize()).await.map(|_| ())
    }

    async fn list_functions(&self) -> std::result::Result<Vec<RemoteFunction>, TransportError> {
        let result = self.send_request(&JsonRpcRequest::list_tools()).await?.into_result()?;
        parse_tool_list(result)
    }

    async fn call(&self, function: &str, arguments: Value) -> std::result::Result<Value, TransportError> {
        let result = self
            .send_request(&JsonRpcRequest::call_tool(function, arguments))
            .await?
            .into_result()?;
        parse_call_result(result)
    }

    async fn ping(&self) -> std::result::Result<(), TransportError> {
        self.send_request(&JsonRpcRequest::ping()).await.map(|_| ())
    }

    async fn disconnect(&self) {
        debug!("HTTP transport for {} has no session to close", self.service_id);
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }
}
