//! Server registry: the active set of tool servers for one config generation

use super::types::ServerDescriptor;
use crate::config::Config;
use crate::error::{RelayError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Active tool servers keyed by name
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: BTreeMap<String, Arc<ServerDescriptor>>,
}

impl ServerRegistry {
    /// Build the registry from configuration.
    ///
    /// Disabled servers, servers without credentials and servers with no way
    /// to reach them are skipped with a warning.
    pub fn load(config: &Config) -> Self {
        let mut servers = BTreeMap::new();

        for server in &config.servers {
            if !server.enabled {
                warn!("⚠️ [REGISTRY] Server '{}' is disabled, skipping", server.name);
                continue;
            }
            if !server.has_endpoint() {
                warn!("⚠️ [REGISTRY] Server '{}' has neither api_url nor command, skipping", server.name);
                continue;
            }
            if !server.has_credentials() {
                warn!("⚠️ [REGISTRY] Server '{}' is missing its API key, skipping", server.name);
                continue;
            }

            let descriptor = ServerDescriptor::from_config(server);
            info!(
                "📋 [REGISTRY] Registered server '{}' ({} transport, timeout {}s, retry budget {}, cache ttl {}s)",
                descriptor.name,
                descriptor.transport,
                descriptor.timeout.as_secs(),
                descriptor.retry_budget,
                descriptor.cache_ttl.as_secs()
            );
            servers.insert(descriptor.name.clone(), Arc::new(descriptor));
        }

        Self { servers }
    }

    /// Look up a server by name
    pub fn lookup(&self, name: &str) -> Result<Arc<ServerDescriptor>> {
        self.servers
            .get(name)
            .cloned()
            .ok_or_else(|| RelayError::registry(format!("Server '{}' not found", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    /// Server names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<ServerDescriptor>> {
        self.servers.values()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
