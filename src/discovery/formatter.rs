//! Deterministic reply formatting
//!
//! Used for command replies and as the last resort when the LLM is
//! unavailable. Output depends only on the input.

use crate::config::CommandRouteConfig;
use crate::discovery::commands::BUILTIN_PREFIX;
use crate::mcp::ConnectionStatus;
use crate::registry::FunctionDescriptor;
use crate::routing::ExecutionResult;
use crate::services::StatusReport;
use serde_json::Value;
use std::collections::BTreeMap;

/// Reply to free text when no LLM provider is configured
pub const NO_PROVIDER_REPLY: &str =
    "I can only run commands right now. Try `/tools help` to see what is available.";

/// Reply when the LLM itself failed
pub const LLM_UNAVAILABLE_REPLY: &str =
    "Sorry, I can't answer that right now. Commands still work; try `/tools help`.";

/// Plain text of a tool result.
///
/// MCP-style `{"content": [{"type": "text", "text": ...}]}` payloads are
/// flattened to their text, strings are returned as is, anything else is
/// pretty-printed JSON.
pub fn result_text(data: &Value) -> String {
    if let Some(items) = data.get("content").and_then(|c| c.as_array()) {
        let texts: Vec<&str> = items
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect();
        if !texts.is_empty() {
            return texts.join("\n");
        }
    }
    match data {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub fn format_execution_result(result: &ExecutionResult) -> String {
    let name = result.qualified_name();
    match (&result.error, &result.data) {
        (Some(error), _) => format!("❌ {} failed: {}", name, error),
        (None, data) => {
            let body = data.as_ref().map(result_text).unwrap_or_default();
            let cached = if result.cached { " (cached)" } else { "" };
            format!("✅ {}{} in {}ms\n{}", name, cached, result.execution_time_ms, body)
                .trim_end()
                .to_string()
        }
    }
}

pub fn format_status(report: &StatusReport) -> String {
    let mut lines = vec![format!(
        "🔌 Tool servers: {}/{} connected",
        report.connected_count(),
        report.servers.len()
    )];

    for server in report.servers.values() {
        let icon = match server.status {
            ConnectionStatus::Connected => "✅",
            ConnectionStatus::Connecting => "⏳",
            ConnectionStatus::Disconnected => "⚪",
            ConnectionStatus::Error => "❌",
        };
        let mut line = format!(
            "{} {} ({}, {}): {}, {} functions",
            icon, server.display_name, server.name, server.transport, server.status, server.function_count
        );
        if let Some(error) = &server.last_error {
            line.push_str(&format!(", last error: {}", error));
        }
        lines.push(line);
    }

    let cache = &report.cache_stats;
    lines.push(format!(
        "🎯 Cache: {}/{} entries, hit rate {:.0}%",
        cache.size,
        cache.max_size,
        cache.hit_rate * 100.0
    ));

    let metrics = &report.metrics_summary;
    lines.push(format!(
        "📊 Calls: {} total, {} ok, {} failed, {} denied, {} not found",
        metrics.total_calls, metrics.success_calls, metrics.fail_calls, metrics.denied_calls, metrics.not_found_calls
    ));
    for usage in &metrics.top_functions {
        lines.push(format!(
            "   {}: {} calls, {:.0}% ok, {:.0}ms avg",
            usage.function,
            usage.calls,
            usage.success_rate * 100.0,
            usage.avg_time_ms
        ));
    }

    lines.join("\n")
}

/// Functions grouped by server
pub fn format_functions(functions: &[FunctionDescriptor]) -> String {
    if functions.is_empty() {
        return "No functions available.".to_string();
    }

    let mut by_server: BTreeMap<&str, Vec<&FunctionDescriptor>> = BTreeMap::new();
    for function in functions {
        by_server.entry(function.server.as_str()).or_default().push(function);
    }

    let mut lines = Vec::new();
    for (server, mut functions) in by_server {
        functions.sort_by(|a, b| a.name.cmp(&b.name));
        lines.push(format!("📦 {}", server));
        for function in functions {
            lines.push(format!(
                "   {} [{}] {}",
                function.qualified_name(),
                function.class,
                function.description
            ));
        }
    }
    lines.join("\n")
}

pub fn format_help(routes: &[CommandRouteConfig]) -> String {
    let mut lines = vec![
        "Available commands:".to_string(),
        format!("   {} status - server, cache and call statistics", BUILTIN_PREFIX),
        format!("   {} functions [server] - functions you can call", BUILTIN_PREFIX),
        format!("   {} help - this text", BUILTIN_PREFIX),
    ];
    for route in routes {
        let arguments: String = route.arguments.iter().map(|a| format!(" <{}>", a)).collect();
        let description = route
            .description
            .clone()
            .unwrap_or_else(|| format!("calls {}", route.function));
        lines.push(format!("   {}{} - {}", route.prefix, arguments, description));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_result_text_flattens_content() {
        let data = json!({"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]});
        assert_eq!(result_text(&data), "a\nb");
        assert_eq!(result_text(&json!("plain")), "plain");
        assert_eq!(result_text(&json!({"rows": 1})), "{\n  \"rows\": 1\n}");
    }

    #[test]
    fn test_format_failure() {
        let result = ExecutionResult::failure("ghost", "doit", ErrorKind::NotFound, "unknown server 'ghost'", 0);
        assert_eq!(
            format_execution_result(&result),
            "❌ ghost__doit failed: not found: unknown server 'ghost'"
        );
    }

    #[test]
    fn test_format_cached_success() {
        let result = ExecutionResult::success("data", "listProjects", json!("p1"), 3).with_cached(true);
        assert_eq!(format_execution_result(&result), "✅ data__listProjects (cached) in 3ms\np1");
    }

    #[test]
    fn test_help_lists_routes() {
        let routes = vec![CommandRouteConfig {
            prefix: "/docs".to_string(),
            function: "docs__search".to_string(),
            arguments: vec!["library".to_string(), "topic".to_string()],
            fixed_arguments: Default::default(),
            description: None,
        }];
        let help = format_help(&routes);
        assert!(help.contains("/tools status"));
        assert!(help.contains("/docs <library> <topic> - calls docs__search"));
    }
}
