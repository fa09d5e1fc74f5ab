//! MCP (Model Context Protocol) client side
//!
//! Everything needed to talk to downstream tool servers: the JSON-RPC
//! messages, the transports behind [`ToolTransport`], health probing and the
//! connection supervisor that owns per-server state.

pub mod jsonrpc;
pub mod transport;
// Network transports
pub mod clients;
// Child-process transport
pub mod external_process;
pub mod health_checker;
pub mod connection_supervisor;

pub use clients::HttpTransport;
pub use connection_supervisor::{
    ConnectionSnapshot, ConnectionState, ConnectionStatus, ConnectionSupervisor, ServerConnection,
};
pub use external_process::StdioTransport;
pub use health_checker::{HealthCheckConfig, HealthCheckResult, McpHealthChecker};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
pub use transport::{DefaultTransportFactory, ToolTransport, TransportFactory};
