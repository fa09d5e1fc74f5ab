//! Dispatch router
//!
//! The single entry point for executing a function on a tool server. Every
//! failure past this boundary is an [`ExecutionResult`] with an [`ErrorKind`];
//! nothing is raised to the caller.
//!
//! Order of checks: lookup, permission, parameters and guard, cache,
//! connection, call. A denied call never reaches the supervisor or the cache.

use crate::config::ManagerConfig;
use crate::error::{ErrorKind, TransportError};
use crate::mcp::{ConnectionSupervisor, ServerConnection};
use crate::metrics::MetricsCollector;
use crate::registry::{split_qualified_name, FunctionDescriptor, ServerDescriptor, ServerRegistry};
use crate::routing::cache::ResultCache;
use crate::routing::retry::RetryPolicy;
use crate::routing::types::ExecutionResult;
use crate::security::{Identity, KeywordGuard, PermissionDecision, PermissionGate};
use arc_swap::ArcSwap;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Routes function calls to tool servers
pub struct DispatchRouter {
    registry: ArcSwap<ServerRegistry>,
    supervisor: Arc<ConnectionSupervisor>,
    permissions: Arc<PermissionGate>,
    guard: Arc<KeywordGuard>,
    cache: Arc<ResultCache>,
    metrics: Arc<MetricsCollector>,
    manager: ArcSwap<ManagerConfig>,
}

impl DispatchRouter {
    pub fn new(
        registry: ServerRegistry,
        supervisor: Arc<ConnectionSupervisor>,
        permissions: Arc<PermissionGate>,
        guard: Arc<KeywordGuard>,
        cache: Arc<ResultCache>,
        metrics: Arc<MetricsCollector>,
        manager: ManagerConfig,
    ) -> Self {
        Self {
            registry: ArcSwap::from_pointee(registry),
            supervisor,
            permissions,
            guard,
            cache,
            metrics,
            manager: ArcSwap::from_pointee(manager),
        }
    }

    pub fn registry(&self) -> Arc<ServerRegistry> {
        self.registry.load_full()
    }

    /// Swap in a new registry; calls already in flight keep the old one
    pub fn replace_registry(&self, registry: ServerRegistry) {
        self.registry.store(Arc::new(registry));
    }

    pub fn set_manager_config(&self, manager: ManagerConfig) {
        self.manager.store(Arc::new(manager));
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn permissions(&self) -> &Arc<PermissionGate> {
        &self.permissions
    }

    /// Execute a function given its exposed `"server__function"` name
    pub async fn execute_qualified(
        &self,
        identity: &Identity,
        qualified_name: &str,
        params: Value,
        use_cache: bool,
    ) -> ExecutionResult {
        match split_qualified_name(qualified_name) {
            Some((server, function)) => self.execute(identity, server, function, params, use_cache).await,
            None => {
                self.metrics.record_not_found().await;
                ExecutionResult::failure(
                    "",
                    qualified_name,
                    ErrorKind::NotFound,
                    format!("'{}' is not a server__function name", qualified_name),
                    0,
                )
            }
        }
    }

    /// Execute one function call. Metrics are updated exactly once.
    pub async fn execute(
        &self,
        identity: &Identity,
        server: &str,
        function: &str,
        params: Value,
        use_cache: bool,
    ) -> ExecutionResult {
        let started = Instant::now();
        let mut result = self.dispatch(identity, server, function, params, use_cache, started).await;
        result.execution_time_ms = elapsed_ms(started);
        self.record(&result).await;

        match &result.error {
            None => debug!(
                "[ROUTER] {}__{} succeeded in {}ms (cached: {})",
                server, function, result.execution_time_ms, result.cached
            ),
            Some(error) => info!("[ROUTER] {}__{} failed: {}", server, function, error),
        }
        result
    }

    async fn record(&self, result: &ExecutionResult) {
        match result.error_kind() {
            Some(ErrorKind::NotFound) => self.metrics.record_not_found().await,
            Some(ErrorKind::PermissionDenied) => self.metrics.record_denied().await,
            _ if result.cached => {
                self.metrics
                    .record_cache_hit(&result.server, &result.function, result.execution_time_ms)
                    .await
            }
            _ => {
                self.metrics
                    .record(
                        &result.server,
                        &result.function,
                        result.success,
                        result.execution_time_ms,
                        result.error.as_ref().map(|e| e.to_string()),
                    )
                    .await
            }
        }
    }

    async fn dispatch(
        &self,
        identity: &Identity,
        server_name: &str,
        function_name: &str,
        params: Value,
        use_cache: bool,
        started: Instant,
    ) -> ExecutionResult {
        let fail = |kind: ErrorKind, message: String| {
            ExecutionResult::failure(server_name, function_name, kind, message, elapsed_ms(started))
        };

        // 1. lookup
        let server = match self.registry.load().lookup(server_name) {
            Ok(server) => server,
            Err(_) => return fail(ErrorKind::NotFound, format!("unknown server '{}'", server_name)),
        };
        let conn = match self.supervisor.get(server_name).await {
            Some(conn) => conn,
            None => return fail(ErrorKind::NotFound, format!("unknown server '{}'", server_name)),
        };

        let function = match conn.function(function_name).await {
            Some(function) => function,
            None => {
                // Not in the catalog, which may not be listed yet. Without a
                // descriptor only the coarse server grant can be checked, so it
                // runs before the function name is resolved and before the
                // connection is touched.
                if self.permissions.allowed_classes(identity, &server).is_empty() {
                    warn!(
                        "🚫 [ROUTER] '{}' has no permissions on server '{}'",
                        identity.id, server_name
                    );
                    return fail(
                        ErrorKind::PermissionDenied,
                        format!("identity '{}' has no access to '{}'", identity.id, server_name),
                    );
                }
                let conn = match self.supervisor.ensure_connected(server_name).await {
                    Ok(conn) => conn,
                    Err(e) => return fail(ErrorKind::Unavailable, e),
                };
                if let Err(e) = conn.ensure_catalog().await {
                    warn!("⚠️ [ROUTER] Listing functions of '{}' failed: {}", server_name, e);
                    return fail(ErrorKind::Unavailable, format!("function listing failed: {}", e));
                }
                match conn.function(function_name).await {
                    Some(function) => function,
                    None => {
                        return fail(
                            ErrorKind::NotFound,
                            format!("server '{}' has no function '{}'", server_name, function_name),
                        )
                    }
                }
            }
        };

        // 2. permission
        if let PermissionDecision::Deny { reason } = self.permissions.authorize(identity, &server, &function) {
            warn!("🚫 [ROUTER] Denied {}: {}", function.qualified_name(), reason);
            return fail(ErrorKind::PermissionDenied, reason);
        }

        // parameters and destructive-keyword guard
        let params = if params.is_null() { json!({}) } else { params };
        if let Err(e) = function.validate_arguments(&params) {
            return fail(ErrorKind::ValidationError, e);
        }
        if let Err(e) = self.guard.check(&function, &params) {
            return fail(ErrorKind::ValidationError, e);
        }

        // 3. cache
        let cache_key = (use_cache && function.cacheable)
            .then(|| ResultCache::key(server_name, function_name, &params));
        if let Some(key) = &cache_key {
            if let Some(value) = self.cache.get(key).await {
                debug!("🎯 [ROUTER] Cache hit for {}", function.qualified_name());
                return ExecutionResult::success(server_name, function_name, value, elapsed_ms(started))
                    .with_cached(true);
            }
        }

        // 4. connection
        let conn = match self.supervisor.ensure_connected(server_name).await {
            Ok(conn) => conn,
            Err(e) => return fail(ErrorKind::Unavailable, e),
        };

        // 5. call
        let value = match self.call_with_retry(&conn, &server, &function, params).await {
            Ok(value) => value,
            Err((kind, message)) => return fail(kind, message),
        };

        // 6. cache write
        if let Some(key) = cache_key {
            self.cache.set(key, value.clone(), server.cache_ttl).await;
        }

        ExecutionResult::success(server_name, function_name, value, elapsed_ms(started))
    }

    /// Call with the server deadline. Only refusals are retried; a timed-out
    /// call may have had side effects and is never repeated.
    async fn call_with_retry(
        &self,
        conn: &ServerConnection,
        server: &ServerDescriptor,
        function: &FunctionDescriptor,
        params: Value,
    ) -> std::result::Result<Value, (ErrorKind, String)> {
        let policy = RetryPolicy::for_server(server.retry_budget, &self.manager.load());
        let mut retries = 0;

        loop {
            let outcome = timeout(server.timeout, conn.call(&function.name, params.clone())).await;
            match outcome {
                Ok(Ok(value)) => return Ok(value),
                Err(_) => {
                    let message = format!("no response within {}s", server.timeout.as_secs());
                    conn.record_call_error(&message).await;
                    warn!("⏱️ [ROUTER] {} timed out", function.qualified_name());
                    return Err((ErrorKind::Timeout, message));
                }
                Ok(Err(error)) if policy.should_retry(&error, retries) => {
                    let delay = policy.calculate_delay(retries);
                    retries += 1;
                    warn!(
                        "🔄 [ROUTER] {} refused, retry {}/{} in {:?}: {}",
                        function.qualified_name(),
                        retries,
                        policy.max_retries,
                        delay,
                        error
                    );
                    sleep(delay).await;
                }
                Ok(Err(TransportError::Refused(message))) => {
                    conn.mark_unreachable(&message).await;
                    return Err((ErrorKind::Unavailable, message));
                }
                Ok(Err(TransportError::Remote(message))) | Ok(Err(TransportError::Protocol(message))) => {
                    conn.record_call_error(&message).await;
                    return Err((ErrorKind::RemoteError, message));
                }
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
