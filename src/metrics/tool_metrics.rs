//! Function-level metrics collection
//!
//! One aggregate per `(server, function)`. Counters only ever grow, and every
//! recorded call lands in exactly one of success or failure, so
//! `success_calls + fail_calls == total_calls` holds at every read. Denied and
//! not-found calls never reach a function record; they have global counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

/// Errors kept per function
pub const RECENT_ERRORS_PER_FUNCTION: usize = 10;

/// Default list sizes for [`MetricsCollector::default_summary`]
pub const DEFAULT_SUMMARY_SIZE: usize = 5;

/// A failed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Qualified function name
    pub function: String,
    /// Error text
    pub message: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    sequence: u64,
}

/// Aggregate for one function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionMetrics {
    /// Owning server
    pub server: String,
    /// Local function name
    pub function: String,
    /// Calls recorded
    pub total_calls: u64,
    /// Successful calls, cache hits included
    pub success_calls: u64,
    /// Failed calls
    pub fail_calls: u64,
    /// Successful calls served from cache
    pub cache_hits: u64,
    /// Sum of latencies
    pub total_time_ms: u64,
    /// Last call of any outcome
    pub last_call: Option<DateTime<Utc>>,
    /// Bounded ring of recent failures, oldest first
    pub recent_errors: VecDeque<ErrorRecord>,
}

impl FunctionMetrics {
    fn new(server: &str, function: &str) -> Self {
        Self {
            server: server.to_string(),
            function: function.to_string(),
            total_calls: 0,
            success_calls: 0,
            fail_calls: 0,
            cache_hits: 0,
            total_time_ms: 0,
            last_call: None,
            recent_errors: VecDeque::with_capacity(RECENT_ERRORS_PER_FUNCTION),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.success_calls as f64 / self.total_calls as f64
        }
    }

    pub fn avg_time_ms(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_time_ms as f64 / self.total_calls as f64
        }
    }
}

/// Usage line in the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionUsage {
    /// Qualified function name
    pub function: String,
    pub calls: u64,
    pub success_rate: f64,
    pub avg_time_ms: f64,
}

/// Read-only summary for status output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_calls: u64,
    pub success_calls: u64,
    pub fail_calls: u64,
    pub success_rate: f64,
    /// Calls refused by the permission gate
    pub denied_calls: u64,
    /// Calls naming an unknown server or function
    pub not_found_calls: u64,
    pub top_functions: Vec<FunctionUsage>,
    pub recent_errors: Vec<ErrorRecord>,
}

#[derive(Debug, Default)]
struct MetricsState {
    functions: HashMap<(String, String), FunctionMetrics>,
    denied_calls: u64,
    not_found_calls: u64,
    error_sequence: u64,
}

/// Shared metrics collector
#[derive(Debug, Default)]
pub struct MetricsCollector {
    state: RwLock<MetricsState>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished call
    pub async fn record(
        &self,
        server: &str,
        function: &str,
        success: bool,
        latency_ms: u64,
        error: Option<String>,
    ) {
        self.record_inner(server, function, success, latency_ms, error, false).await;
    }

    /// Record a successful call served from cache
    pub async fn record_cache_hit(&self, server: &str, function: &str, latency_ms: u64) {
        self.record_inner(server, function, true, latency_ms, None, true).await;
    }

    async fn record_inner(
        &self,
        server: &str,
        function: &str,
        success: bool,
        latency_ms: u64,
        error: Option<String>,
        cached: bool,
    ) {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let now = Utc::now();

        let metrics = state
            .functions
            .entry((server.to_string(), function.to_string()))
            .or_insert_with(|| FunctionMetrics::new(server, function));

        metrics.total_calls += 1;
        metrics.total_time_ms = metrics.total_time_ms.saturating_add(latency_ms);
        metrics.last_call = Some(now);

        if success {
            metrics.success_calls += 1;
            if cached {
                metrics.cache_hits += 1;
            }
            debug!("✅ [METRICS] {}__{} ok ({}ms{})", server, function, latency_ms, if cached { ", cached" } else { "" });
        } else {
            metrics.fail_calls += 1;
            state.error_sequence += 1;
            let message = error.unwrap_or_else(|| "unknown error".to_string());
            debug!("❌ [METRICS] {}__{} failed: {} ({}ms)", server, function, message, latency_ms);

            if metrics.recent_errors.len() >= RECENT_ERRORS_PER_FUNCTION {
                metrics.recent_errors.pop_front();
            }
            metrics.recent_errors.push_back(ErrorRecord {
                function: format!("{}__{}", server, function),
                message,
                timestamp: now,
                sequence: state.error_sequence,
            });
        }
    }

    /// Count a call refused by the permission gate
    pub async fn record_denied(&self) {
        self.state.write().await.denied_calls += 1;
    }

    /// Count a call naming an unknown server or function
    pub async fn record_not_found(&self) {
        self.state.write().await.not_found_calls += 1;
    }

    /// Snapshot of one function's aggregate
    pub async fn function_metrics(&self, server: &str, function: &str) -> Option<FunctionMetrics> {
        self.state
            .read()
            .await
            .functions
            .get(&(server.to_string(), function.to_string()))
            .cloned()
    }

    /// Snapshot of every aggregate
    pub async fn all_function_metrics(&self) -> Vec<FunctionMetrics> {
        self.state.read().await.functions.values().cloned().collect()
    }

    pub async fn summary(&self, top_n: usize, errors_n: usize) -> MetricsSummary {
        let state = self.state.read().await;

        let (mut total, mut success, mut fail) = (0u64, 0u64, 0u64);
        for metrics in state.functions.values() {
            total += metrics.total_calls;
            success += metrics.success_calls;
            fail += metrics.fail_calls;
        }

        let mut usage: Vec<FunctionUsage> = state
            .functions
            .values()
            .map(|m| FunctionUsage {
                function: format!("{}__{}", m.server, m.function),
                calls: m.total_calls,
                success_rate: m.success_rate(),
                avg_time_ms: m.avg_time_ms(),
            })
            .collect();
        usage.sort_by(|a, b| b.calls.cmp(&a.calls).then_with(|| a.function.cmp(&b.function)));
        usage.truncate(top_n);

        let mut errors: Vec<ErrorRecord> = state
            .functions
            .values()
            .flat_map(|m| m.recent_errors.iter().cloned())
            .collect();
        errors.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        errors.truncate(errors_n);

        MetricsSummary {
            total_calls: total,
            success_calls: success,
            fail_calls: fail,
            success_rate: if total > 0 { success as f64 / total as f64 } else { 0.0 },
            denied_calls: state.denied_calls,
            not_found_calls: state.not_found_calls,
            top_functions: usage,
            recent_errors: errors,
        }
    }

    /// Summary with five top functions and five recent errors
    pub async fn default_summary(&self) -> MetricsSummary {
        self.summary(DEFAULT_SUMMARY_SIZE, DEFAULT_SUMMARY_SIZE).await
    }
}
