//! Status surface shared by the orchestrator and the bridge

use crate::routing::DispatchRouter;
use crate::services::types::{ServerStatus, ServiceState, StatusReport};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Assembles [`StatusReport`]s from the live components
pub struct StatusBoard {
    router: Arc<DispatchRouter>,
    state: RwLock<ServiceState>,
}

impl StatusBoard {
    pub fn new(router: Arc<DispatchRouter>) -> Self {
        Self {
            router,
            state: RwLock::new(ServiceState::Initializing),
        }
    }

    pub async fn state(&self) -> ServiceState {
        *self.state.read().await
    }

    pub async fn set_state(&self, state: ServiceState) {
        *self.state.write().await = state;
    }

    pub async fn report(&self) -> StatusReport {
        let servers = self
            .router
            .supervisor()
            .snapshot()
            .await
            .into_iter()
            .map(|snapshot| (snapshot.descriptor.name.clone(), ServerStatus::from(snapshot)))
            .collect();

        StatusReport {
            state: self.state().await,
            servers,
            cache_stats: self.router.cache().stats().await,
            metrics_summary: self.router.metrics().default_summary().await,
        }
    }
}
