//! Startup logging

use crate::config::Config;
use crate::services::StatusReport;
use std::path::Path;
use tracing::{info, warn};

/// Prints what was loaded and what came up
pub struct StartupLogger;

impl StartupLogger {
    /// Display configuration summary
    pub fn display_startup_info(config: &Config, config_path: &Path, version: &str) {
        info!("🚀 ToolRelay v{} starting...", version);
        info!("");

        info!("📁 Configuration:");
        info!("   Config file: {:?} ✅", config_path);
        info!("   Log level: {} ({})", config.logging.level, config.logging.format);
        info!("");

        Self::display_servers(config);
        Self::display_features(config);
    }

    fn display_servers(config: &Config) {
        info!("🔌 Tool Servers:");
        if config.servers.is_empty() {
            warn!("   ⚠️  No servers configured");
        }
        for server in &config.servers {
            let transport = if server.command.is_some() { "stdio" } else { "http" };
            if !server.enabled {
                info!("   ⚪ {} (disabled)", server.name);
            } else if !server.has_endpoint() {
                warn!("   ⚠️  {} (no api_url or command)", server.name);
            } else if !server.has_credentials() {
                warn!("   ⚠️  {} ({}, missing api_key)", server.name, transport);
            } else {
                info!(
                    "   ✅ {} ({}, timeout {}s, cache ttl {}s)",
                    server.name, transport, server.timeout, server.cache_ttl
                );
            }
        }
        info!("");
    }

    fn display_features(config: &Config) {
        info!("🎯 Feature Status:");
        info!(
            "   ✅ Permissions ({} roles, {} identities)",
            config.permissions.roles.len(),
            config.permissions.identities.len()
        );
        info!(
            "   ✅ Keyword guard ({} keywords)",
            config.security.destructive_keywords.len()
        );
        info!(
            "   ✅ Result cache (max {} entries)",
            config.manager.cache_max_size
        );
        match &config.llm {
            Some(llm) => info!("   ✅ LLM bridge ({} / {})", llm.provider, llm.model),
            None => info!("   ❌ LLM bridge (not configured; commands only)"),
        }
        info!("   ✅ Command routes ({})", config.commands.len());
        if config.manager.health_check_interval == 0 {
            info!("   ❌ Periodic health checks (disabled)");
        } else {
            info!("   ✅ Periodic health checks (every {}s)", config.manager.health_check_interval);
        }
        info!("");
    }

    /// Display connection outcome after `start()`
    pub fn display_ready(report: &StatusReport) {
        info!(
            "✅ ToolRelay ready: {}/{} servers connected",
            report.connected_count(),
            report.servers.len()
        );
        for server in report.servers.values() {
            if let Some(error) = &server.last_error {
                warn!("   ⚠️  {}: {} ({})", server.name, server.status, error);
            }
        }
    }
}

/// Display startup banner with version information
pub fn display_startup_banner(version: &str) {
    info!("");
    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║                        ToolRelay v{}                          ║", version);
    info!("║            Permissioned Tool-Server Orchestration            ║");
    info!("╚══════════════════════════════════════════════════════════════╝");
    info!("");
}
