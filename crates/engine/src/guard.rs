//! Pre-write guards: composite-key uniqueness and cascade deletion.

use std::sync::Arc;

use grantlink_core::{
    CascadeBlockedKind, EngineError, EngineResult, PermissionId, RoleId, TenantId, TenantRoleId,
    TenantRolePermissionId, TenantRoleUserId, UserId,
};
use grantlink_store::AssociationStore;

/// Checks composite-key uniqueness before a write.
///
/// `exclude` carries the id of the row being updated so it does not
/// conflict with itself; `None` on create. A `true` conflict answer is a
/// hard failure and the mutation must be aborted before any write. The
/// check is a point-in-time snapshot, not a lock: two racing creates can
/// both pass it, in which case the storage backend's own constraint
/// produces the same [`EngineError::DuplicateAssociation`].
#[derive(Clone)]
pub struct UniquenessGuard {
    store: Arc<dyn AssociationStore>,
}

impl UniquenessGuard {
    pub fn new(store: Arc<dyn AssociationStore>) -> Self {
        Self { store }
    }

    pub async fn tenant_role_conflicts(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        exclude: Option<TenantRoleId>,
    ) -> EngineResult<bool> {
        self.store.tenant_role_conflicts(tenant_id, role_id, exclude).await
    }

    pub async fn ensure_tenant_role_unique(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        exclude: Option<TenantRoleId>,
    ) -> EngineResult<()> {
        if self.tenant_role_conflicts(tenant_id, role_id, exclude).await? {
            return Err(EngineError::duplicate("tenant_id and role_id"));
        }
        Ok(())
    }

    pub async fn ensure_permission_grant_unique(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
        exclude: Option<TenantRolePermissionId>,
    ) -> EngineResult<()> {
        if self
            .store
            .permission_grant_conflicts(tenant_role_id, permission_id, exclude)
            .await?
        {
            return Err(EngineError::duplicate("tenant_role_id and permission_id"));
        }
        Ok(())
    }

    pub async fn ensure_user_grant_unique(
        &self,
        tenant_role_id: TenantRoleId,
        user_id: UserId,
        exclude: Option<TenantRoleUserId>,
    ) -> EngineResult<()> {
        if self.store.user_grant_conflicts(tenant_role_id, user_id, exclude).await? {
            return Err(EngineError::duplicate("tenant_role_id and user_id"));
        }
        Ok(())
    }
}

/// Outcome of the cascade-deletion check for one TenantRole.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeletionVerdict {
    Allowed,
    BlockedByUsers,
    BlockedByPermissions,
}

impl DeletionVerdict {
    /// Translate a blocked verdict into the domain error naming which
    /// dependent association must be removed first.
    pub fn into_result(self, tenant_role_id: TenantRoleId) -> EngineResult<()> {
        match self {
            DeletionVerdict::Allowed => Ok(()),
            DeletionVerdict::BlockedByUsers => {
                Err(EngineError::cascade_blocked(CascadeBlockedKind::Users, tenant_role_id))
            }
            DeletionVerdict::BlockedByPermissions => Err(EngineError::cascade_blocked(
                CascadeBlockedKind::Permissions,
                tenant_role_id,
            )),
        }
    }
}

/// Blocks deletion of a TenantRole while dependent associations remain.
///
/// Two independent counting reads, users checked first. The guard is
/// stateless; a delete blocked now succeeds later once the dependent
/// rows are gone.
#[derive(Clone)]
pub struct CascadeDeletionGuard {
    store: Arc<dyn AssociationStore>,
}

impl CascadeDeletionGuard {
    pub fn new(store: Arc<dyn AssociationStore>) -> Self {
        Self { store }
    }

    pub async fn can_delete(&self, tenant_role_id: TenantRoleId) -> EngineResult<DeletionVerdict> {
        if self.store.count_user_grants_for(tenant_role_id).await? > 0 {
            return Ok(DeletionVerdict::BlockedByUsers);
        }
        if self.store.count_permission_grants_for(tenant_role_id).await? > 0 {
            return Ok(DeletionVerdict::BlockedByPermissions);
        }
        Ok(DeletionVerdict::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grantlink_store::MemoryStore;

    fn store() -> Arc<dyn AssociationStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn a_row_does_not_conflict_with_itself() {
        let store = store();
        let row = store
            .insert_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        let guard = UniquenessGuard::new(store);

        assert!(!guard
            .tenant_role_conflicts(TenantId::new(100), RoleId::new(10), Some(row.id))
            .await
            .unwrap());
        assert!(guard
            .tenant_role_conflicts(TenantId::new(100), RoleId::new(10), None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn another_row_with_the_same_key_still_conflicts() {
        // Two rows cannot normally share a key; simulate the check an
        // update would run when moving row 2 onto row 1's key.
        let store = store();
        let first = store
            .insert_tenant_role(TenantId::new(1), RoleId::new(1))
            .await
            .unwrap();
        let second = store
            .insert_tenant_role(TenantId::new(1), RoleId::new(2))
            .await
            .unwrap();
        let guard = UniquenessGuard::new(store);

        // Excluding second, first still occupies (1, 1).
        assert!(guard
            .tenant_role_conflicts(TenantId::new(1), RoleId::new(1), Some(second.id))
            .await
            .unwrap());
        // Excluding first, nothing else occupies (1, 1).
        assert!(!guard
            .tenant_role_conflicts(TenantId::new(1), RoleId::new(1), Some(first.id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn cascade_guard_reports_users_before_permissions() {
        let store = store();
        let tenant_role = store
            .insert_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        let guard = CascadeDeletionGuard::new(store.clone());

        assert_eq!(guard.can_delete(tenant_role.id).await.unwrap(), DeletionVerdict::Allowed);

        let permission_grant = store
            .insert_permission_grant(tenant_role.id, PermissionId::new(1))
            .await
            .unwrap();
        assert_eq!(
            guard.can_delete(tenant_role.id).await.unwrap(),
            DeletionVerdict::BlockedByPermissions
        );

        // With both kinds present, users win.
        let user_grant = store.insert_user_grant(tenant_role.id, UserId::new(999)).await.unwrap();
        assert_eq!(
            guard.can_delete(tenant_role.id).await.unwrap(),
            DeletionVerdict::BlockedByUsers
        );

        // The guard is idempotent: removing the dependents unblocks it.
        store.delete_user_grant(user_grant.id).await.unwrap();
        store.delete_permission_grant(permission_grant.id).await.unwrap();
        assert_eq!(guard.can_delete(tenant_role.id).await.unwrap(), DeletionVerdict::Allowed);
    }

    #[tokio::test]
    async fn blocked_verdicts_carry_the_kind() {
        let id = TenantRoleId::new(55);
        assert!(DeletionVerdict::Allowed.into_result(id).is_ok());
        assert!(matches!(
            DeletionVerdict::BlockedByUsers.into_result(id),
            Err(EngineError::CascadeBlocked {
                blocked_by: CascadeBlockedKind::Users,
                ..
            })
        ));
        assert!(matches!(
            DeletionVerdict::BlockedByPermissions.into_result(id),
            Err(EngineError::CascadeBlocked {
                blocked_by: CascadeBlockedKind::Permissions,
                ..
            })
        ));
    }
}
