//! Active health checking for tool servers

use crate::config::ManagerConfig;
use crate::mcp::transport::ToolTransport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, warn};

/// Configuration for health checking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckConfig {
    /// Timeout for individual health checks
    pub timeout_seconds: u64,
    /// How often to perform health checks (0 disables the timer)
    pub check_interval_seconds: u64,
    /// Number of consecutive failures before marking as errored
    pub max_consecutive_failures: u32,
    /// Probe before a call when the last probe is older than this
    pub stale_after_seconds: u64,
    /// Probe before a call when the error count is above this
    pub error_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self::from(&ManagerConfig::default())
    }
}

impl From<&ManagerConfig> for HealthCheckConfig {
    fn from(manager: &ManagerConfig) -> Self {
        Self {
            timeout_seconds: manager.health_check_timeout,
            check_interval_seconds: manager.health_check_interval,
            max_consecutive_failures: manager.max_consecutive_failures,
            stale_after_seconds: manager.stale_after,
            error_threshold: manager.error_threshold,
        }
    }
}

impl HealthCheckConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_seconds)
    }
}

/// Outcome of one probe
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error_details: Option<String>,
    pub last_checked: DateTime<Utc>,
}

/// Probes a transport with a bounded `ping`
#[derive(Debug, Clone)]
pub struct McpHealthChecker {
    config: HealthCheckConfig,
}

impl McpHealthChecker {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    pub async fn perform_health_check(&self, server: &str, transport: &dyn ToolTransport) -> HealthCheckResult {
        let start_time = Instant::now();
        let check_time = Utc::now();

        debug!("🏥 [HEALTH] Probing server: {}", server);

        let outcome = timeout(Duration::from_secs(self.config.timeout_seconds), transport.ping()).await;
        let response_time_ms = start_time.elapsed().as_millis() as u64;

        let error_details = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("health check timed out after {}s", self.config.timeout_seconds)),
        };

        match &error_details {
            None => debug!("✅ [HEALTH] Server '{}' healthy ({}ms)", server, response_time_ms),
            Some(error) => warn!("❌ [HEALTH] Server '{}' health check failed: {} ({}ms)", server, error, response_time_ms),
        }

        HealthCheckResult {
            healthy: error_details.is_none(),
            response_time_ms,
            error_details,
            last_checked: check_time,
        }
    }
}
