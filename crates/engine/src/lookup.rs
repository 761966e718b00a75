//! Contracts for entities owned by other bounded contexts.
//!
//! Tenants, roles, permissions, and the per-user "active tenant" record
//! live behind other services; this engine only validates existence and
//! resolves role names through these traits. A transport failure is a
//! [`LookupError`] and maps to [`EngineError::Communication`]; a negative
//! existence answer is a domain fact, never an error here. The two must
//! not be conflated, since callers may retry communication failures but
//! not invalid references.
//!
//! The `Static*`/`Recording*` types are in-memory implementations used in
//! tests and as the fallback wiring when no upstream services are
//! configured.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;

use grantlink_core::{EngineError, PermissionId, RoleId, TenantId, UserId};

/// An external collaborator call failed or timed out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("lookup call failed: {0}")]
pub struct LookupError(pub String);

impl LookupError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<LookupError> for EngineError {
    fn from(err: LookupError) -> Self {
        EngineError::communication(err.0)
    }
}

#[async_trait]
pub trait TenantLookup: Send + Sync {
    async fn exists(&self, tenant_id: TenantId) -> Result<bool, LookupError>;
}

#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn exists(&self, role_id: RoleId) -> Result<bool, LookupError>;

    /// Resolve role names to ids, skipping names that do not exist.
    async fn ids_for_names(&self, names: &[String]) -> Result<Vec<RoleId>, LookupError>;
}

#[async_trait]
pub trait PermissionLookup: Send + Sync {
    async fn exists(&self, permission_id: PermissionId) -> Result<bool, LookupError>;
}

/// Best-effort cleanup of the external "active tenant" record. The caller
/// invokes [`remove`](ActiveTenantLookup::remove) only after confirming
/// the user holds no remaining association under the tenant.
#[async_trait]
pub trait ActiveTenantLookup: Send + Sync {
    async fn remove(&self, user_id: UserId, tenant_id: TenantId) -> Result<(), LookupError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory implementations
// ─────────────────────────────────────────────────────────────────────────────

/// Tenant lookup over a fixed id set. `allow_all` answers true for every
/// id, which is the fallback wiring when no tenant service is configured.
#[derive(Debug, Default)]
pub struct StaticTenantLookup {
    known: BTreeSet<i64>,
    permissive: bool,
}

impl StaticTenantLookup {
    pub fn with_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            known: ids.into_iter().collect(),
            permissive: false,
        }
    }

    pub fn allow_all() -> Self {
        Self {
            known: BTreeSet::new(),
            permissive: true,
        }
    }
}

#[async_trait]
impl TenantLookup for StaticTenantLookup {
    async fn exists(&self, tenant_id: TenantId) -> Result<bool, LookupError> {
        Ok(self.permissive || self.known.contains(&tenant_id.value()))
    }
}

/// Role lookup over a fixed (id, name) catalog.
#[derive(Debug, Default)]
pub struct StaticRoleLookup {
    roles: Vec<(RoleId, String)>,
    permissive: bool,
}

impl StaticRoleLookup {
    pub fn with_roles(roles: impl IntoIterator<Item = (i64, &'static str)>) -> Self {
        Self {
            roles: roles
                .into_iter()
                .map(|(id, name)| (RoleId::new(id), name.to_string()))
                .collect(),
            permissive: false,
        }
    }

    /// Every id exists; name resolution still only knows the catalog.
    pub fn allow_all() -> Self {
        Self {
            roles: Vec::new(),
            permissive: true,
        }
    }
}

#[async_trait]
impl RoleLookup for StaticRoleLookup {
    async fn exists(&self, role_id: RoleId) -> Result<bool, LookupError> {
        Ok(self.permissive || self.roles.iter().any(|(id, _)| *id == role_id))
    }

    async fn ids_for_names(&self, names: &[String]) -> Result<Vec<RoleId>, LookupError> {
        Ok(self
            .roles
            .iter()
            .filter(|(_, name)| names.contains(name))
            .map(|(id, _)| *id)
            .collect())
    }
}

/// Permission lookup over a fixed id set.
#[derive(Debug, Default)]
pub struct StaticPermissionLookup {
    known: BTreeSet<i64>,
    permissive: bool,
}

impl StaticPermissionLookup {
    pub fn with_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            known: ids.into_iter().collect(),
            permissive: false,
        }
    }

    pub fn allow_all() -> Self {
        Self {
            known: BTreeSet::new(),
            permissive: true,
        }
    }
}

#[async_trait]
impl PermissionLookup for StaticPermissionLookup {
    async fn exists(&self, permission_id: PermissionId) -> Result<bool, LookupError> {
        Ok(self.permissive || self.known.contains(&permission_id.value()))
    }
}

/// Active-tenant cleanup that records every removal, so tests can assert
/// exactly which (user, tenant) pairs were cleaned up. `failing()` makes
/// every call return a transport error.
#[derive(Debug, Default)]
pub struct RecordingActiveTenantLookup {
    removed: Mutex<Vec<(UserId, TenantId)>>,
    fail: bool,
}

impl RecordingActiveTenantLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            removed: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn removed(&self) -> Vec<(UserId, TenantId)> {
        self.removed.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ActiveTenantLookup for RecordingActiveTenantLookup {
    async fn remove(&self, user_id: UserId, tenant_id: TenantId) -> Result<(), LookupError> {
        if self.fail {
            return Err(LookupError::new("active tenant service unreachable"));
        }
        self.removed
            .lock()
            .map_err(|_| LookupError::new("recording lock poisoned"))?
            .push((user_id, tenant_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_tenant_lookup_answers_from_its_id_set() {
        let lookup = StaticTenantLookup::with_ids([100, 200]);
        assert!(lookup.exists(TenantId::new(100)).await.unwrap());
        assert!(!lookup.exists(TenantId::new(300)).await.unwrap());
        assert!(StaticTenantLookup::allow_all().exists(TenantId::new(300)).await.unwrap());
    }

    #[tokio::test]
    async fn role_name_resolution_skips_unknown_names() {
        let lookup = StaticRoleLookup::with_roles([(10, "publisher"), (11, "editor")]);
        let ids = lookup
            .ids_for_names(&["publisher".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(ids, vec![RoleId::new(10)]);
    }

    #[tokio::test]
    async fn lookup_error_maps_to_communication() {
        let err: EngineError = LookupError::new("connection refused").into();
        assert!(matches!(err, EngineError::Communication(_)));
    }
}
