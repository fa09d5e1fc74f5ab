//! Pluggable tool-server transports
//!
//! The connection supervisor only ever talks to a server through
//! [`ToolTransport`]. Which protocol sits behind it is decided once per server
//! by a [`TransportFactory`].

use super::clients::HttpTransport;
use super::external_process::StdioTransport;
use crate::error::{Result, TransportError};
use crate::registry::{RemoteFunction, ServerDescriptor, TransportKind};
use async_trait::async_trait;
use serde_json::Value;

/// Connection to one tool server
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Establish the connection. Idempotent.
    async fn connect(&self) -> std::result::Result<(), TransportError>;

    /// Functions the server exposes
    async fn list_functions(&self) -> std::result::Result<Vec<RemoteFunction>, TransportError>;

    /// Invoke one function
    async fn call(&self, function: &str, arguments: Value) -> std::result::Result<Value, TransportError>;

    /// Cheap liveness probe
    async fn ping(&self) -> std::result::Result<(), TransportError>;

    /// Tear the connection down; best-effort
    async fn disconnect(&self);

    /// Protocol in use
    fn kind(&self) -> TransportKind;
}

/// Builds the transport for a server
pub trait TransportFactory: Send + Sync {
    fn create(&self, server: &ServerDescriptor) -> Result<Box<dyn ToolTransport>>;
}

/// Stdio when a command is configured, HTTP otherwise
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, server: &ServerDescriptor) -> Result<Box<dyn ToolTransport>> {
        match server.transport {
            TransportKind::Stdio => Ok(Box::new(StdioTransport::new(server)?)),
            TransportKind::Http => Ok(Box::new(HttpTransport::new(server)?)),
        }
    }
}
