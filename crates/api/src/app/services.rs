//! Service wiring: store backend selection and engine construction.

use std::sync::Arc;

use sqlx::PgPool;

use grantlink_engine::{
    AuthorizationQueryEngine, RecordingActiveTenantLookup, StaticPermissionLookup, StaticRoleLookup,
    StaticTenantLookup, TenantRoleOrchestrator,
};
use grantlink_store::{AssociationStore, MemoryStore, PgStore};

/// Everything the handlers need, shared via `Extension<Arc<AppServices>>`.
pub struct AppServices {
    pub orchestrator: TenantRoleOrchestrator,
    pub queries: AuthorizationQueryEngine,
}

/// Wire services from the environment: Postgres when `DATABASE_URL` is
/// set, otherwise the in-memory store.
///
/// The upstream tenant/role/permission services are out of scope for
/// this deployment, so the lookup contracts are wired permissively; swap
/// in real clients here when those services exist.
pub async fn build_services() -> anyhow::Result<AppServices> {
    let store: Arc<dyn AssociationStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = PgPool::connect(&url).await?;
            let store = PgStore::new(pool);
            store.ensure_schema().await?;
            tracing::info!("using postgres association store");
            Arc::new(store)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory association store");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(wire(store))
}

/// In-memory wiring for tests and local development.
pub fn memory_services() -> AppServices {
    wire(Arc::new(MemoryStore::new()))
}

fn wire(store: Arc<dyn AssociationStore>) -> AppServices {
    let roles = Arc::new(StaticRoleLookup::allow_all());
    AppServices {
        orchestrator: TenantRoleOrchestrator::new(
            store.clone(),
            Arc::new(StaticTenantLookup::allow_all()),
            Arc::new(StaticPermissionLookup::allow_all()),
            Arc::new(RecordingActiveTenantLookup::new()),
        ),
        queries: AuthorizationQueryEngine::new(store, roles),
    }
}
