//! Call metrics

pub mod tool_metrics;

pub use tool_metrics::{
    ErrorRecord, FunctionMetrics, FunctionUsage, MetricsCollector, MetricsSummary,
    DEFAULT_SUMMARY_SIZE, RECENT_ERRORS_PER_FUNCTION,
};
