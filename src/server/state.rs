use axum::extract::FromRef;

use crate::admission::CarNameAdmission;
use crate::background_jobs::SchedulerHandle;
use crate::catalog_store::CatalogStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedCatalogStore = Arc<dyn CatalogStore>;
pub type OptionalSchedulerHandle = Option<SchedulerHandle>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub catalog_store: GuardedCatalogStore,
    pub admission: CarNameAdmission,
    pub scheduler_handle: OptionalSchedulerHandle,
}

impl FromRef<ServerState> for GuardedCatalogStore {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog_store.clone()
    }
}

impl FromRef<ServerState> for CarNameAdmission {
    fn from_ref(input: &ServerState) -> Self {
        input.admission.clone()
    }
}

impl FromRef<ServerState> for OptionalSchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler_handle.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
