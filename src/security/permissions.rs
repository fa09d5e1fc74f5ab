//! Permission gate
//!
//! Maps a caller identity to the function classes it may invoke on each server.
//! Grants are recomputed from the static role table on every call; the table
//! itself can be swapped atomically when the configuration is reloaded.

use crate::config::PermissionsConfig;
use crate::registry::{FunctionClass, FunctionDescriptor, ServerDescriptor, ServerRegistry};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Role key that applies to every server
pub const ANY_SERVER: &str = "*";

/// Caller identity supplied by the chat front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id
    pub id: String,
    /// Display handle, if known
    pub username: Option<String>,
}

impl Identity {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            username: None,
        }
    }

    pub fn with_username<S: Into<String>>(mut self, username: S) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Lowercase and strip a leading '@'
fn normalize_username(username: &str) -> String {
    username.trim().trim_start_matches('@').to_lowercase()
}

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny { reason: String },
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionDecision::Allow)
    }
}

/// Immutable snapshot of the role and identity tables
#[derive(Debug, Default)]
struct PermissionTable {
    roles: HashMap<String, HashMap<String, HashSet<FunctionClass>>>,
    roles_by_id: HashMap<String, String>,
    roles_by_username: HashMap<String, String>,
}

impl PermissionTable {
    fn from_config(config: &PermissionsConfig) -> Self {
        let roles = config
            .roles
            .iter()
            .map(|(role, grants)| {
                let grants = grants
                    .iter()
                    .map(|(server, classes)| (server.clone(), classes.iter().copied().collect()))
                    .collect();
                (role.clone(), grants)
            })
            .collect();

        let mut roles_by_id = HashMap::new();
        let mut roles_by_username = HashMap::new();
        for identity in &config.identities {
            if let Some(id) = &identity.id {
                roles_by_id.insert(id.clone(), identity.role.clone());
            }
            if let Some(username) = &identity.username {
                roles_by_username.insert(normalize_username(username), identity.role.clone());
            }
        }

        Self {
            roles,
            roles_by_id,
            roles_by_username,
        }
    }

    fn role_for(&self, identity: &Identity) -> Option<&str> {
        if let Some(role) = self.roles_by_id.get(&identity.id) {
            return Some(role);
        }
        identity
            .username
            .as_deref()
            .and_then(|u| self.roles_by_username.get(&normalize_username(u)))
            .map(String::as_str)
    }

    fn classes_for(&self, identity: &Identity, server: &ServerDescriptor) -> HashSet<FunctionClass> {
        let Some(grants) = self.role_for(identity).and_then(|role| self.roles.get(role)) else {
            return HashSet::new();
        };

        grants
            .get(&server.name)
            .into_iter()
            .chain(grants.get(ANY_SERVER))
            .flatten()
            .copied()
            .filter(|class| server.permits_class(*class))
            .collect()
    }
}

/// Identity to permission mapping with hot-swappable tables
pub struct PermissionGate {
    table: ArcSwap<PermissionTable>,
}

impl PermissionGate {
    pub fn new(config: &PermissionsConfig) -> Self {
        Self {
            table: ArcSwap::from_pointee(PermissionTable::from_config(config)),
        }
    }

    /// Replace the role and identity tables
    pub fn reload(&self, config: &PermissionsConfig) {
        self.table.store(Arc::new(PermissionTable::from_config(config)));
    }

    /// Whether the identity has any role at all
    pub fn is_privileged(&self, identity: &Identity) -> bool {
        self.table.load().role_for(identity).is_some()
    }

    /// Allowed classes per server; empty for non-privileged identities
    pub fn resolve(
        &self,
        identity: &Identity,
        registry: &ServerRegistry,
    ) -> HashMap<String, HashSet<FunctionClass>> {
        let table = self.table.load();
        registry
            .descriptors()
            .filter_map(|server| {
                let classes = table.classes_for(identity, server);
                (!classes.is_empty()).then(|| (server.name.clone(), classes))
            })
            .collect()
    }

    /// Allowed classes on one server
    pub fn allowed_classes(&self, identity: &Identity, server: &ServerDescriptor) -> HashSet<FunctionClass> {
        self.table.load().classes_for(identity, server)
    }

    /// Check one call
    pub fn authorize(
        &self,
        identity: &Identity,
        server: &ServerDescriptor,
        function: &FunctionDescriptor,
    ) -> PermissionDecision {
        let classes = self.table.load().classes_for(identity, server);
        if classes.contains(&function.class) {
            PermissionDecision::Allow
        } else {
            debug!(
                "[PERMISSIONS] '{}' lacks {} on server '{}'",
                identity.id, function.class, server.name
            );
            PermissionDecision::Deny {
                reason: format!(
                    "identity '{}' may not call {} functions on '{}'",
                    identity.id, function.class, server.name
                ),
            }
        }
    }
}
