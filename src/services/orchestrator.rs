//! The orchestrator
//!
//! Built once at process start and handed to whatever needs it. Owns the
//! registry, the connection supervisor, the router with its cache and metrics,
//! the bridge and the periodic health loop.

use crate::config::Config;
use crate::discovery::{AiBridge, Reply};
use crate::error::Result;
use crate::llm::{create_provider, LlmProvider};
use crate::mcp::{ConnectionSupervisor, DefaultTransportFactory, HealthCheckConfig, TransportFactory};
use crate::metrics::MetricsCollector;
use crate::registry::{FunctionDescriptor, ServerRegistry};
use crate::routing::{DispatchRouter, ExecutionResult, ResultCache};
use crate::security::{Identity, KeywordGuard, PermissionGate};
use crate::services::status::StatusBoard;
use crate::services::types::{ServiceState, StatusReport};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

struct HealthTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Wires every component together and runs the lifecycle
pub struct Orchestrator {
    config: RwLock<Config>,
    router: Arc<DispatchRouter>,
    supervisor: Arc<ConnectionSupervisor>,
    permissions: Arc<PermissionGate>,
    guard: Arc<KeywordGuard>,
    bridge: AiBridge,
    status: Arc<StatusBoard>,
    health_task: Mutex<Option<HealthTask>>,
}

impl Orchestrator {
    /// Build from an already validated config
    pub async fn new(
        config: Config,
        factory: Arc<dyn TransportFactory>,
        provider: Option<Arc<dyn LlmProvider>>,
    ) -> Result<Self> {
        let registry = ServerRegistry::load(&config);
        info!("📋 [REGISTRY] {} active servers: {:?}", registry.len(), registry.names());

        let supervisor = Arc::new(ConnectionSupervisor::new(
            factory,
            HealthCheckConfig::from(&config.manager),
        ));
        supervisor.replace_registry(&registry).await;

        let permissions = Arc::new(PermissionGate::new(&config.permissions));
        let guard = Arc::new(KeywordGuard::new(&config.security.destructive_keywords)?);
        let cache = Arc::new(ResultCache::new(config.manager.cache_max_size));
        let metrics = Arc::new(MetricsCollector::new());

        let router = Arc::new(DispatchRouter::new(
            registry,
            Arc::clone(&supervisor),
            Arc::clone(&permissions),
            Arc::clone(&guard),
            cache,
            metrics,
            config.manager.clone(),
        ));
        let status = Arc::new(StatusBoard::new(Arc::clone(&router)));
        let bridge = AiBridge::new(&config, Arc::clone(&router), Arc::clone(&status), provider);

        Ok(Self {
            config: RwLock::new(config),
            router,
            supervisor,
            permissions,
            guard,
            bridge,
            status,
            health_task: Mutex::new(None),
        })
    }

    /// Build with the real transports and the configured LLM provider
    pub async fn from_config(config: Config) -> Result<Self> {
        let provider = match &config.llm {
            Some(llm) => Some(create_provider(llm)?),
            None => {
                info!("🤖 [LLM] No provider configured; only commands will be answered");
                None
            }
        };
        Self::new(config, Arc::new(DefaultTransportFactory), provider).await
    }

    pub fn router(&self) -> &Arc<DispatchRouter> {
        &self.router
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn bridge(&self) -> &AiBridge {
        &self.bridge
    }

    /// Connect every server and start the health loop
    pub async fn start(&self) -> HashMap<String, bool> {
        let results = self.supervisor.connect_all().await;
        let connected = results.values().filter(|ok| **ok).count();
        info!("🔌 [SUPERVISOR] {}/{} servers connected", connected, results.len());
        for (name, ok) in &results {
            if !ok {
                warn!("⚠️ [SUPERVISOR] Server '{}' is not connected; calls will retry lazily", name);
            }
        }

        self.restart_health_loop().await;
        self.status.set_state(ServiceState::Running).await;
        results
    }

    async fn restart_health_loop(&self) {
        self.stop_health_loop().await;

        let seconds = self.supervisor.health_config().await.check_interval_seconds;
        if seconds == 0 {
            info!("🏥 [HEALTH] Periodic health checks disabled");
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let supervisor = Arc::clone(&self.supervisor);
        let cache = Arc::clone(self.router.cache());

        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(seconds));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately; servers were just connected
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let results = supervisor.health_check_all().await;
                        let healthy = results.values().filter(|ok| **ok).count();
                        debug!("🏥 [HEALTH] {}/{} servers healthy", healthy, results.len());

                        let expired = cache.cleanup_expired().await;
                        if expired > 0 {
                            debug!("🧹 [CACHE] Removed {} expired entries", expired);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("🏥 [HEALTH] Health loop stopped");
        });

        info!("🏥 [HEALTH] Health checks every {}s", seconds);
        *self.health_task.lock().await = Some(HealthTask { shutdown, handle });
    }

    async fn stop_health_loop(&self) {
        let task = self.health_task.lock().await.take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                error!("Health loop ended abnormally: {}", e);
            }
        }
    }

    /// Execute `server`'s `function`
    pub async fn execute(
        &self,
        identity: &Identity,
        server: &str,
        function: &str,
        params: Value,
        use_cache: bool,
    ) -> ExecutionResult {
        self.router.execute(identity, server, function, params, use_cache).await
    }

    /// Execute by exposed `server__function` name
    pub async fn execute_qualified(
        &self,
        identity: &Identity,
        name: &str,
        params: Value,
        use_cache: bool,
    ) -> ExecutionResult {
        self.router.execute_qualified(identity, name, params, use_cache).await
    }

    pub async fn list_functions(&self, server: Option<&str>) -> Result<Vec<FunctionDescriptor>> {
        self.supervisor.list_functions(server).await
    }

    /// Functions the identity may call
    pub async fn functions_for(&self, identity: &Identity) -> Vec<FunctionDescriptor> {
        self.bridge.callable_functions(identity).await
    }

    pub async fn status(&self) -> StatusReport {
        self.status.report().await
    }

    /// Handle one inbound message through the bridge
    pub async fn handle_message(&self, text: &str, identity: &Identity) -> Reply {
        self.bridge.handle(text, identity).await
    }

    /// Apply a new config.
    ///
    /// The registry is replaced wholesale: removed servers are disconnected,
    /// every server in the new registry starts disconnected and is then
    /// connected again. Permissions, guard and command routes are swapped
    /// in place. The cache is cleared.
    pub async fn reload(&self, config: Config) -> Result<()> {
        info!("🔄 Reloading configuration");

        // fallible first, so a bad keyword list leaves everything untouched
        self.guard.reload(&config.security.destructive_keywords)?;
        self.permissions.reload(&config.permissions);

        let registry = ServerRegistry::load(&config);
        self.supervisor
            .set_health_config(HealthCheckConfig::from(&config.manager))
            .await;
        self.supervisor.replace_registry(&registry).await;
        self.router.replace_registry(registry);
        self.router.set_manager_config(config.manager.clone());

        let cache = self.router.cache();
        cache.clear().await;
        cache.set_max_size(config.manager.cache_max_size).await;

        self.bridge.reload(&config);
        *self.config.write().await = config;

        if self.status.state().await == ServiceState::Running {
            self.start().await;
        }
        info!("✅ Configuration reloaded");
        Ok(())
    }

    /// Stop the health loop and disconnect everything; best-effort
    pub async fn shutdown(&self) {
        info!("🛑 Shutting down");
        self.status.set_state(ServiceState::Stopping).await;
        self.stop_health_loop().await;
        self.supervisor.disconnect_all().await;
        self.status.set_state(ServiceState::Stopped).await;
        info!("✅ Shutdown completed");
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
