//! Status surface types

use crate::mcp::{ConnectionSnapshot, ConnectionStatus};
use crate::metrics::MetricsSummary;
use crate::registry::TransportKind;
use crate::routing::CacheStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Built, not started
    Initializing,
    /// Servers connected and health loop running
    Running,
    /// Shutting down
    Stopping,
    /// Shut down
    Stopped,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Initializing => write!(f, "initializing"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopping => write!(f, "stopping"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// One server in the status surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub name: String,
    pub display_name: String,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub transport: TransportKind,
    pub function_count: usize,
}

impl From<ConnectionSnapshot> for ServerStatus {
    fn from(snapshot: ConnectionSnapshot) -> Self {
        Self {
            name: snapshot.descriptor.name.clone(),
            display_name: snapshot.descriptor.display_name.clone(),
            status: snapshot.state.status,
            last_error: snapshot.state.last_error,
            connected_at: snapshot.state.connected_at,
            enabled: snapshot.descriptor.enabled,
            transport: snapshot.transport,
            function_count: snapshot.function_count,
        }
    }
}

/// `status()` output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: ServiceState,
    pub servers: BTreeMap<String, ServerStatus>,
    pub cache_stats: CacheStats,
    pub metrics_summary: MetricsSummary,
}

impl StatusReport {
    pub fn connected_count(&self) -> usize {
        self.servers
            .values()
            .filter(|s| s.status == ConnectionStatus::Connected)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_state_display() {
        assert_eq!(ServiceState::Running.to_string(), "running");
        assert_eq!(ServiceState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_connection_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ConnectionStatus::Error).unwrap(), "error");
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
    }
}
