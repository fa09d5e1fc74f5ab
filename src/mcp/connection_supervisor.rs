//! Connection supervisor
//!
//! Owns one [`ServerConnection`] per registered server and is the only code
//! that mutates a [`ConnectionState`]. Per server the state machine is
//! `disconnected → connecting → {connected, error}`, `connected → disconnected`
//! on explicit disconnect and `connected → error` after repeated failed probes.
//! An errored server is reconnected lazily by the next call.

use crate::error::{RelayError, Result, TransportError};
use crate::mcp::health_checker::{HealthCheckConfig, McpHealthChecker};
use crate::mcp::transport::{ToolTransport, TransportFactory};
use crate::registry::{build_catalog, FunctionDescriptor, ServerDescriptor, ServerRegistry, TransportKind};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// Connection status of one server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Mutable per-server record
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    /// Monotonic time of the last probe (or connect)
    pub last_probe: Option<Instant>,
    /// Call and probe failures since the last successful connect
    pub error_count: u32,
    /// Failed probes in a row
    pub consecutive_failures: u32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_error: None,
            connected_at: None,
            last_probe: None,
            error_count: 0,
            consecutive_failures: 0,
        }
    }
}

/// A server, its transport and its catalog
pub struct ServerConnection {
    pub descriptor: Arc<ServerDescriptor>,
    transport: Box<dyn ToolTransport>,
    state: RwLock<ConnectionState>,
    /// `None` until a listing has succeeded for the current connection
    functions: RwLock<Option<Vec<FunctionDescriptor>>>,
    connect_lock: Mutex<()>,
}

impl ServerConnection {
    fn new(descriptor: Arc<ServerDescriptor>, transport: Box<dyn ToolTransport>) -> Self {
        Self {
            descriptor,
            transport,
            state: RwLock::new(ConnectionState::default()),
            functions: RwLock::new(None),
            connect_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Catalog for the current connection, if loaded
    pub async fn functions(&self) -> Option<Vec<FunctionDescriptor>> {
        self.functions.read().await.clone()
    }

    pub async fn function(&self, name: &str) -> Option<FunctionDescriptor> {
        self.functions
            .read()
            .await
            .as_ref()
            .and_then(|fs| fs.iter().find(|f| f.name == name).cloned())
    }

    /// Invoke a function. The caller applies the deadline.
    pub async fn call(&self, function: &str, arguments: Value) -> std::result::Result<Value, TransportError> {
        self.transport.call(function, arguments).await
    }

    /// Count a failed call against this connection
    pub async fn record_call_error(&self, message: &str) {
        let mut state = self.state.write().await;
        state.error_count += 1;
        state.last_error = Some(message.to_string());
    }

    /// The server refused every attempt; reconnect on the next call
    pub async fn mark_unreachable(&self, message: &str) {
        let mut state = self.state.write().await;
        state.status = ConnectionStatus::Error;
        state.last_error = Some(message.to_string());
        warn!("🔌 [SUPERVISOR] Server '{}' marked as errored: {}", self.name(), message);
    }

    /// List the server's functions again if the listing after connect failed
    pub async fn ensure_catalog(&self) -> std::result::Result<(), String> {
        if self.functions.read().await.is_some() {
            return Ok(());
        }
        let count = self.load_catalog().await?;
        debug!("[CATALOG] Listed {} functions of '{}' on demand", count, self.name());
        Ok(())
    }

    async fn load_catalog(&self) -> std::result::Result<usize, String> {
        let listing = timeout(self.descriptor.timeout, self.transport.list_functions())
            .await
            .map_err(|_| "function listing timed out".to_string())?
            .map_err(|e| e.to_string())?;

        let catalog = build_catalog(&self.descriptor, listing);
        let count = catalog.len();
        *self.functions.write().await = Some(catalog);
        Ok(count)
    }
}

/// Snapshot used by the status surface
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub descriptor: Arc<ServerDescriptor>,
    pub transport: TransportKind,
    pub state: ConnectionState,
    pub function_count: usize,
}

/// Supervises every server connection
pub struct ConnectionSupervisor {
    connections: RwLock<BTreeMap<String, Arc<ServerConnection>>>,
    factory: Arc<dyn TransportFactory>,
    health_checker: RwLock<McpHealthChecker>,
}

impl ConnectionSupervisor {
    pub fn new(factory: Arc<dyn TransportFactory>, health_config: HealthCheckConfig) -> Self {
        Self {
            connections: RwLock::new(BTreeMap::new()),
            factory,
            health_checker: RwLock::new(McpHealthChecker::new(health_config)),
        }
    }

    /// Replace every connection with fresh, disconnected ones for `registry`.
    /// Old connections are disconnected best-effort.
    pub async fn replace_registry(&self, registry: &ServerRegistry) {
        let mut fresh = BTreeMap::new();
        for descriptor in registry.descriptors() {
            match self.factory.create(descriptor) {
                Ok(transport) => {
                    fresh.insert(
                        descriptor.name.clone(),
                        Arc::new(ServerConnection::new(Arc::clone(descriptor), transport)),
                    );
                }
                Err(e) => {
                    warn!("⚠️ [SUPERVISOR] Cannot build transport for '{}': {}", descriptor.name, e);
                }
            }
        }

        let old = {
            let mut connections = self.connections.write().await;
            std::mem::replace(&mut *connections, fresh)
        };

        join_all(old.values().map(|conn| Self::disconnect_connection(conn))).await;
    }

    pub async fn set_health_config(&self, config: HealthCheckConfig) {
        *self.health_checker.write().await = McpHealthChecker::new(config);
    }

    pub async fn health_config(&self) -> HealthCheckConfig {
        self.health_checker.read().await.config().clone()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<ServerConnection>> {
        self.connections.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    async fn all(&self) -> Vec<Arc<ServerConnection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Connect one server. Idempotent; failures end up in the returned state.
    pub async fn connect(&self, name: &str) -> Result<ConnectionState> {
        let conn = self
            .get(name)
            .await
            .ok_or_else(|| RelayError::registry(format!("Server '{}' not found", name)))?;
        Ok(Self::connect_connection(&conn).await)
    }

    async fn connect_connection(conn: &ServerConnection) -> ConnectionState {
        let _connecting = conn.connect_lock.lock().await;

        let previous = conn.state().await;
        if previous.status == ConnectionStatus::Connected {
            return previous;
        }
        if previous.status == ConnectionStatus::Error {
            // drop whatever is left of the broken session first
            conn.transport.disconnect().await;
        }

        conn.state.write().await.status = ConnectionStatus::Connecting;
        *conn.functions.write().await = None;
        info!("🔌 [SUPERVISOR] Connecting to '{}' ({})", conn.name(), conn.transport.kind());

        let outcome = match timeout(conn.descriptor.timeout, conn.transport.connect()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => {
                conn.transport.disconnect().await;
                Err(format!("connect timed out after {}s", conn.descriptor.timeout.as_secs()))
            }
        };

        match outcome {
            Ok(()) => {
                {
                    let mut state = conn.state.write().await;
                    state.status = ConnectionStatus::Connected;
                    state.connected_at = Some(Utc::now());
                    state.last_error = None;
                    state.last_probe = Some(Instant::now());
                    state.error_count = 0;
                    state.consecutive_failures = 0;
                }
                match conn.load_catalog().await {
                    Ok(count) => info!("✅ [SUPERVISOR] Connected to '{}' ({} functions)", conn.name(), count),
                    Err(e) => warn!("⚠️ [SUPERVISOR] Connected to '{}' but listing failed: {}", conn.name(), e),
                }
            }
            Err(error) => {
                let mut state = conn.state.write().await;
                state.status = ConnectionStatus::Error;
                state.error_count += 1;
                state.last_error = Some(error.clone());
                warn!("❌ [SUPERVISOR] Failed to connect to '{}': {}", conn.name(), error);
            }
        }

        conn.state().await
    }

    /// Connect every server concurrently
    pub async fn connect_all(&self) -> HashMap<String, bool> {
        let connections = self.all().await;
        let results = join_all(connections.iter().map(|conn| async move {
            let state = Self::connect_connection(conn).await;
            (conn.name().to_string(), state.status == ConnectionStatus::Connected)
        }))
        .await;
        results.into_iter().collect()
    }

    /// Probe one server. Never-connected servers report unhealthy without a probe.
    pub async fn health_check(&self, name: &str) -> bool {
        match self.get(name).await {
            Some(conn) => self.probe(&conn).await,
            None => false,
        }
    }

    async fn probe(&self, conn: &ServerConnection) -> bool {
        let status = conn.state().await.status;
        if matches!(status, ConnectionStatus::Disconnected | ConnectionStatus::Connecting) {
            return false;
        }

        let checker = self.health_checker.read().await.clone();
        let result = checker.perform_health_check(conn.name(), conn.transport.as_ref()).await;
        let max_failures = checker.config().max_consecutive_failures;

        let mut state = conn.state.write().await;
        state.last_probe = Some(Instant::now());
        if result.healthy {
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
            state.error_count += 1;
            state.last_error = result.error_details.clone();
            if state.consecutive_failures >= max_failures && state.status != ConnectionStatus::Error {
                state.status = ConnectionStatus::Error;
                warn!(
                    "🚨 [HEALTH] Server '{}' marked as errored after {} consecutive failures",
                    conn.name(),
                    state.consecutive_failures
                );
            }
        }
        result.healthy
    }

    /// Probe every server concurrently
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let connections = self.all().await;
        let results = join_all(connections.iter().map(|conn| async move {
            (conn.name().to_string(), self.probe(conn).await)
        }))
        .await;
        results.into_iter().collect()
    }

    /// Make sure a server is usable for a call.
    ///
    /// A connected server is probed first if its last probe is stale or it has
    /// accumulated too many errors. A server that is not connected gets exactly
    /// one reconnect attempt.
    pub async fn ensure_connected(&self, name: &str) -> std::result::Result<Arc<ServerConnection>, String> {
        let conn = self
            .get(name)
            .await
            .ok_or_else(|| format!("server '{}' is not registered", name))?;

        let state = conn.state().await;
        if state.status == ConnectionStatus::Connected {
            let config = self.health_config().await;
            let stale = state
                .last_probe
                .map(|at| at.elapsed() > config.stale_after())
                .unwrap_or(true);
            if stale || state.error_count > config.error_threshold {
                debug!("[SUPERVISOR] Probing '{}' before call (stale: {}, errors: {})", name, stale, state.error_count);
                self.probe(&conn).await;
            }
        }

        if conn.state().await.status == ConnectionStatus::Connected {
            return Ok(conn);
        }

        info!("🔄 [SUPERVISOR] Reconnecting to '{}' before call", name);
        let state = Self::connect_connection(&conn).await;
        if state.status == ConnectionStatus::Connected {
            Ok(conn)
        } else {
            Err(state.last_error.unwrap_or_else(|| "reconnect failed".to_string()))
        }
    }

    /// Functions of one server, or of every connected server.
    ///
    /// A connected server whose listing has not succeeded yet is listed again;
    /// if that fails the server is skipped.
    pub async fn list_functions(&self, server: Option<&str>) -> Result<Vec<FunctionDescriptor>> {
        let connections = match server {
            Some(name) => vec![self
                .get(name)
                .await
                .ok_or_else(|| RelayError::registry(format!("Server '{}' not found", name)))?],
            None => self.all().await,
        };

        let mut functions = Vec::new();
        for conn in connections {
            if conn.state().await.status != ConnectionStatus::Connected {
                debug!("[CATALOG] Skipping '{}': not connected", conn.name());
                continue;
            }
            if let Err(e) = conn.ensure_catalog().await {
                warn!("⚠️ [CATALOG] Listing functions of '{}' failed: {}", conn.name(), e);
                continue;
            }
            functions.extend(conn.functions().await.unwrap_or_default());
        }
        Ok(functions)
    }

    pub async fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        let mut snapshots = Vec::new();
        for conn in self.all().await {
            snapshots.push(ConnectionSnapshot {
                descriptor: Arc::clone(&conn.descriptor),
                transport: conn.transport.kind(),
                state: conn.state().await,
                function_count: conn.functions().await.map(|f| f.len()).unwrap_or(0),
            });
        }
        snapshots
    }

    async fn disconnect_connection(conn: &ServerConnection) {
        let _connecting = conn.connect_lock.lock().await;
        conn.transport.disconnect().await;
        let mut state = conn.state.write().await;
        if state.status != ConnectionStatus::Disconnected {
            info!("🔌 [SUPERVISOR] Disconnected from '{}'", conn.name());
        }
        state.status = ConnectionStatus::Disconnected;
        state.connected_at = None;
    }

    pub async fn disconnect(&self, name: &str) -> Result<()> {
        let conn = self
            .get(name)
            .await
            .ok_or_else(|| RelayError::registry(format!("Server '{}' not found", name)))?;
        Self::disconnect_connection(&conn).await;
        Ok(())
    }

    /// Disconnect everything; best-effort
    pub async fn disconnect_all(&self) {
        let connections = self.all().await;
        join_all(connections.iter().map(|conn| Self::disconnect_connection(conn))).await;
    }
}
