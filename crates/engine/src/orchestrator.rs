//! Use-case layer: validate-then-act sequences over the association
//! graph, plus the read facade the adapter consumes.
//!
//! Each mutation is a single-shot sequence: mandatory fields are already
//! guaranteed by the types, external references are confirmed through
//! the lookup contracts, the guards run, then the store is written. No
//! internal retries; every failure propagates as the [`EngineError`]
//! kind raised at the point of detection.
//!
//! Tenant existence is confirmed when creating or updating a TenantRole;
//! role existence deliberately is not, matching the upstream behavior
//! this engine replaces (see DESIGN.md). Permission existence is
//! confirmed when assigning a permission.

use std::sync::Arc;

use tracing::instrument;

use grantlink_core::{
    EngineError, EngineResult, Page, PageRequest, PermissionGrantFilter, PermissionId, ReferenceKind, RoleId,
    TenantId, TenantRole, TenantRoleFilter, TenantRoleId, TenantRolePermission, TenantRolePermissionId,
    TenantRoleUser, TenantRoleUserId, UserGrantFilter, UserId,
};
use grantlink_store::AssociationStore;

use crate::guard::{CascadeDeletionGuard, UniquenessGuard};
use crate::lookup::{ActiveTenantLookup, PermissionLookup, TenantLookup};

/// Coordinates mutations of the association graph.
#[derive(Clone)]
pub struct TenantRoleOrchestrator {
    store: Arc<dyn AssociationStore>,
    tenants: Arc<dyn TenantLookup>,
    permissions: Arc<dyn PermissionLookup>,
    active_tenants: Arc<dyn ActiveTenantLookup>,
    uniqueness: UniquenessGuard,
    cascade: CascadeDeletionGuard,
}

impl TenantRoleOrchestrator {
    pub fn new(
        store: Arc<dyn AssociationStore>,
        tenants: Arc<dyn TenantLookup>,
        permissions: Arc<dyn PermissionLookup>,
        active_tenants: Arc<dyn ActiveTenantLookup>,
    ) -> Self {
        Self {
            uniqueness: UniquenessGuard::new(store.clone()),
            cascade: CascadeDeletionGuard::new(store.clone()),
            store,
            tenants,
            permissions,
            active_tenants,
        }
    }

    async fn ensure_tenant_exists(&self, tenant_id: TenantId) -> EngineResult<()> {
        if !self.tenants.exists(tenant_id).await? {
            return Err(EngineError::invalid_reference(ReferenceKind::Tenant, tenant_id));
        }
        Ok(())
    }

    async fn require_tenant_role(&self, id: TenantRoleId) -> EngineResult<TenantRole> {
        self.store
            .tenant_role_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("tenant role {}", id)))
    }

    // ── TenantRole use cases ────────────────────────────────────────────

    #[instrument(skip(self), err)]
    pub async fn create_tenant_role(&self, tenant_id: TenantId, role_id: RoleId) -> EngineResult<TenantRole> {
        self.ensure_tenant_exists(tenant_id).await?;
        self.uniqueness
            .ensure_tenant_role_unique(tenant_id, role_id, None)
            .await?;
        self.store.insert_tenant_role(tenant_id, role_id).await
    }

    #[instrument(skip(self), err)]
    pub async fn update_tenant_role(
        &self,
        id: TenantRoleId,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> EngineResult<TenantRole> {
        self.require_tenant_role(id).await?;
        self.ensure_tenant_exists(tenant_id).await?;
        self.uniqueness
            .ensure_tenant_role_unique(tenant_id, role_id, Some(id))
            .await?;
        let record = TenantRole { id, tenant_id, role_id };
        self.store.update_tenant_role(&record).await?;
        Ok(record)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_tenant_role(&self, id: TenantRoleId) -> EngineResult<()> {
        self.require_tenant_role(id).await?;
        self.cascade.can_delete(id).await?.into_result(id)?;
        self.store.delete_tenant_role(id).await?;
        Ok(())
    }

    // ── Permission assignment ───────────────────────────────────────────

    #[instrument(skip(self), err)]
    pub async fn assign_permission(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
    ) -> EngineResult<TenantRolePermission> {
        if !self.permissions.exists(permission_id).await? {
            return Err(EngineError::invalid_reference(ReferenceKind::Permission, permission_id));
        }
        self.require_tenant_role(tenant_role_id).await?;
        self.uniqueness
            .ensure_permission_grant_unique(tenant_role_id, permission_id, None)
            .await?;
        self.store.insert_permission_grant(tenant_role_id, permission_id).await
    }

    /// Remove a permission grant addressed by (tenant, role, permission).
    /// Each resolution step that finds nothing is its own `NotFound`.
    #[instrument(skip(self), err)]
    pub async fn unassign_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> EngineResult<()> {
        let tenant_role_id = self
            .store
            .tenant_role_id_for(tenant_id, role_id)
            .await?
            .ok_or_else(|| {
                EngineError::not_found(format!("tenant role for tenant {} and role {}", tenant_id, role_id))
            })?;
        let grant_id = self
            .store
            .permission_grant_id_for(tenant_role_id, permission_id)
            .await?
            .ok_or_else(|| {
                EngineError::not_found(format!(
                    "permission {} assignment under tenant role {}",
                    permission_id, tenant_role_id
                ))
            })?;
        self.store.delete_permission_grant(grant_id).await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn update_permission_grant(
        &self,
        id: TenantRolePermissionId,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
    ) -> EngineResult<TenantRolePermission> {
        if self.store.permission_grant_by_id(id).await?.is_none() {
            return Err(EngineError::not_found(format!("tenant role permission {}", id)));
        }
        self.uniqueness
            .ensure_permission_grant_unique(tenant_role_id, permission_id, Some(id))
            .await?;
        let record = TenantRolePermission { id, tenant_role_id, permission_id };
        self.store.update_permission_grant(&record).await?;
        Ok(record)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_permission_grant(&self, id: TenantRolePermissionId) -> EngineResult<()> {
        if !self.store.delete_permission_grant(id).await? {
            return Err(EngineError::not_found(format!("tenant role permission {}", id)));
        }
        Ok(())
    }

    // ── User assignment ─────────────────────────────────────────────────

    #[instrument(skip(self), err)]
    pub async fn assign_user(&self, tenant_role_id: TenantRoleId, user_id: UserId) -> EngineResult<TenantRoleUser> {
        self.require_tenant_role(tenant_role_id).await?;
        self.uniqueness
            .ensure_user_grant_unique(tenant_role_id, user_id, None)
            .await?;
        self.store.insert_user_grant(tenant_role_id, user_id).await
    }

    /// Remove every grant the user holds under the tenant, optionally
    /// narrowed to a role set (empty means all roles). After the bulk
    /// delete commits, the external active-tenant record is removed when
    /// the user no longer holds anything under that tenant; a failure of
    /// that cleanup surfaces as `Communication` but never undoes the
    /// deletion.
    #[instrument(skip(self), fields(role_count = role_ids.len()), err)]
    pub async fn unassign_user(
        &self,
        tenant_id: TenantId,
        role_ids: &[RoleId],
        user_id: UserId,
    ) -> EngineResult<()> {
        let grant_ids = self.store.user_grant_ids_for(tenant_id, role_ids, user_id).await?;
        if grant_ids.is_empty() {
            return Err(EngineError::not_found(format!(
                "assignments of user {} under tenant {}",
                user_id, tenant_id
            )));
        }
        self.store.delete_user_grants(&grant_ids).await?;
        self.cleanup_active_tenant(user_id, tenant_id).await
    }

    #[instrument(skip(self), err)]
    pub async fn update_user_grant(
        &self,
        id: TenantRoleUserId,
        tenant_role_id: TenantRoleId,
        user_id: UserId,
    ) -> EngineResult<TenantRoleUser> {
        if self.store.user_grant_by_id(id).await?.is_none() {
            return Err(EngineError::not_found(format!("tenant role user {}", id)));
        }
        self.uniqueness
            .ensure_user_grant_unique(tenant_role_id, user_id, Some(id))
            .await?;
        let record = TenantRoleUser { id, tenant_role_id, user_id };
        self.store.update_user_grant(&record).await?;
        Ok(record)
    }

    /// Delete a single user grant by id, with the same active-tenant
    /// cleanup as bulk unassignment.
    #[instrument(skip(self), err)]
    pub async fn delete_user_grant(&self, id: TenantRoleUserId) -> EngineResult<()> {
        let grant = self
            .store
            .user_grant_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("tenant role user {}", id)))?;
        let tenant_role = self.require_tenant_role(grant.tenant_role_id).await?;
        self.store.delete_user_grant(id).await?;
        self.cleanup_active_tenant(grant.user_id, tenant_role.tenant_id).await
    }

    /// Remove the external active-tenant record when the user's last
    /// association under the tenant is gone. The primary deletion has
    /// already committed by the time this runs.
    async fn cleanup_active_tenant(&self, user_id: UserId, tenant_id: TenantId) -> EngineResult<()> {
        if self.store.user_has_tenant_association(user_id, tenant_id).await? {
            return Ok(());
        }
        if let Err(err) = self.active_tenants.remove(user_id, tenant_id).await {
            tracing::warn!(
                user_id = %user_id,
                tenant_id = %tenant_id,
                error = %err,
                "active tenant cleanup failed after committed unassignment"
            );
            return Err(err.into());
        }
        Ok(())
    }

    // ── Read facade ─────────────────────────────────────────────────────

    pub async fn tenant_role(&self, id: TenantRoleId) -> EngineResult<TenantRole> {
        self.require_tenant_role(id).await
    }

    pub async fn tenant_roles_paged(
        &self,
        tenant_id: Option<TenantId>,
        role_id: Option<RoleId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRole>> {
        self.store.tenant_roles_paged(tenant_id, role_id, page).await
    }

    pub async fn tenant_roles_filtered(&self, filter: &TenantRoleFilter) -> EngineResult<Vec<TenantRole>> {
        self.store.tenant_roles_filtered(filter).await
    }

    pub async fn tenant_role_exists(&self, tenant_id: TenantId, role_id: RoleId) -> EngineResult<bool> {
        Ok(self.store.tenant_role_id_for(tenant_id, role_id).await?.is_some())
    }

    pub async fn permission_grant(&self, id: TenantRolePermissionId) -> EngineResult<TenantRolePermission> {
        self.store
            .permission_grant_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("tenant role permission {}", id)))
    }

    pub async fn permission_grants_paged(
        &self,
        tenant_role_id: Option<TenantRoleId>,
        permission_id: Option<PermissionId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRolePermission>> {
        self.store.permission_grants_paged(tenant_role_id, permission_id, page).await
    }

    pub async fn permission_grants_filtered(
        &self,
        filter: &PermissionGrantFilter,
    ) -> EngineResult<Vec<TenantRolePermission>> {
        self.store.permission_grants_filtered(filter).await
    }

    pub async fn user_grant(&self, id: TenantRoleUserId) -> EngineResult<TenantRoleUser> {
        self.store
            .user_grant_by_id(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("tenant role user {}", id)))
    }

    pub async fn user_grants_paged(
        &self,
        tenant_role_id: Option<TenantRoleId>,
        user_id: Option<UserId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRoleUser>> {
        self.store.user_grants_paged(tenant_role_id, user_id, page).await
    }

    pub async fn user_grants_filtered(&self, filter: &UserGrantFilter) -> EngineResult<Vec<TenantRoleUser>> {
        self.store.user_grants_filtered(filter).await
    }

    /// Paged distinct user ids reachable from an optional (tenant, role).
    pub async fn user_ids_paged(
        &self,
        tenant_id: Option<TenantId>,
        role_id: Option<RoleId>,
        page: PageRequest,
    ) -> EngineResult<Page<UserId>> {
        self.store.user_ids_paged(tenant_id, role_id, page).await
    }

    pub async fn total_tenant_roles(&self) -> EngineResult<u64> {
        self.store.count_tenant_roles().await
    }

    pub async fn total_permission_grants(&self) -> EngineResult<u64> {
        self.store.count_permission_grants().await
    }

    pub async fn total_user_grants(&self) -> EngineResult<u64> {
        self.store.count_user_grants().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grantlink_core::CascadeBlockedKind;
    use grantlink_store::MemoryStore;

    use crate::lookup::{LookupError, RecordingActiveTenantLookup, StaticPermissionLookup, StaticTenantLookup};

    struct Fixture {
        active_tenants: Arc<RecordingActiveTenantLookup>,
        orchestrator: TenantRoleOrchestrator,
    }

    /// Tenants 100 and 200 exist, permissions 1..3 exist.
    fn fixture() -> Fixture {
        fixture_with_active_tenants(Arc::new(RecordingActiveTenantLookup::new()))
    }

    fn fixture_with_active_tenants(active_tenants: Arc<RecordingActiveTenantLookup>) -> Fixture {
        let orchestrator = TenantRoleOrchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StaticTenantLookup::with_ids([100, 200])),
            Arc::new(StaticPermissionLookup::with_ids([1, 2, 3])),
            active_tenants.clone(),
        );
        Fixture { active_tenants, orchestrator }
    }

    struct UnreachableTenantLookup;

    #[async_trait]
    impl TenantLookup for UnreachableTenantLookup {
        async fn exists(&self, _tenant_id: TenantId) -> Result<bool, LookupError> {
            Err(LookupError::new("tenant service unreachable"))
        }
    }

    // ── TenantRole ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn creating_the_same_pair_twice_yields_one_success_one_duplicate() {
        let fixture = fixture();
        fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        let err = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateAssociation(_)));
    }

    #[tokio::test]
    async fn create_rejects_an_unknown_tenant() {
        let fixture = fixture();
        let err = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(999), RoleId::new(10))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidReference {
                kind: ReferenceKind::Tenant,
                id: 999
            }
        );
    }

    #[tokio::test]
    async fn role_existence_is_not_checked_on_create() {
        // Only the tenant reference is validated here; a TenantRole can
        // point at a role id no role service knows about.
        let fixture = fixture();
        fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(424242))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn tenant_lookup_transport_failure_is_communication_not_invalid_reference() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let orchestrator = TenantRoleOrchestrator::new(
            store,
            Arc::new(UnreachableTenantLookup),
            Arc::new(StaticPermissionLookup::allow_all()),
            Arc::new(RecordingActiveTenantLookup::new()),
        );
        let err = orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Communication(_)));
    }

    #[tokio::test]
    async fn update_rechecks_uniqueness_excluding_the_row_itself() {
        let fixture = fixture();
        let first = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        let second = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(11))
            .await
            .unwrap();

        // A no-op update of a row onto its own key is allowed.
        fixture
            .orchestrator
            .update_tenant_role(first.id, TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();

        // Moving onto another row's key is a duplicate.
        let err = fixture
            .orchestrator
            .update_tenant_role(second.id, TenantId::new(100), RoleId::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateAssociation(_)));

        // Moving to a fresh key works.
        let updated = fixture
            .orchestrator
            .update_tenant_role(second.id, TenantId::new(200), RoleId::new(11))
            .await
            .unwrap();
        assert_eq!(updated.tenant_id, TenantId::new(200));
    }

    #[tokio::test]
    async fn update_of_a_missing_row_is_not_found() {
        let fixture = fixture();
        let err = fixture
            .orchestrator
            .update_tenant_role(TenantRoleId::new(7), TenantId::new(100), RoleId::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_blocked_while_dependents_remain_and_unblocks_after() {
        let fixture = fixture();
        let tenant_role = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();

        let user_grant = fixture
            .orchestrator
            .assign_user(tenant_role.id, UserId::new(999))
            .await
            .unwrap();
        let err = fixture.orchestrator.delete_tenant_role(tenant_role.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::CascadeBlocked {
                blocked_by: CascadeBlockedKind::Users,
                ..
            }
        ));

        fixture.orchestrator.delete_user_grant(user_grant.id).await.unwrap();
        let permission_grant = fixture
            .orchestrator
            .assign_permission(tenant_role.id, PermissionId::new(1))
            .await
            .unwrap();
        let err = fixture.orchestrator.delete_tenant_role(tenant_role.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::CascadeBlocked {
                blocked_by: CascadeBlockedKind::Permissions,
                ..
            }
        ));

        fixture
            .orchestrator
            .delete_permission_grant(permission_grant.id)
            .await
            .unwrap();
        fixture.orchestrator.delete_tenant_role(tenant_role.id).await.unwrap();

        let err = fixture.orchestrator.delete_tenant_role(tenant_role.id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    // ── Permission assignment ───────────────────────────────────────────

    #[tokio::test]
    async fn assign_permission_validates_permission_then_tenant_role_then_uniqueness() {
        let fixture = fixture();
        let tenant_role = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();

        // Unknown permission is an invalid reference.
        let err = fixture
            .orchestrator
            .assign_permission(tenant_role.id, PermissionId::new(9))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidReference {
                kind: ReferenceKind::Permission,
                id: 9
            }
        );

        // Known permission but missing tenant role is not found.
        let err = fixture
            .orchestrator
            .assign_permission(TenantRoleId::new(12345), PermissionId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        fixture
            .orchestrator
            .assign_permission(tenant_role.id, PermissionId::new(1))
            .await
            .unwrap();
        let err = fixture
            .orchestrator
            .assign_permission(tenant_role.id, PermissionId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateAssociation(_)));
    }

    #[tokio::test]
    async fn unassign_permission_reports_which_resolution_step_failed() {
        let fixture = fixture();

        // No TenantRole for the pair.
        let err = fixture
            .orchestrator
            .unassign_permission(TenantId::new(100), RoleId::new(10), PermissionId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let tenant_role = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();

        // TenantRole exists but the permission was never assigned.
        let err = fixture
            .orchestrator
            .unassign_permission(TenantId::new(100), RoleId::new(10), PermissionId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        fixture
            .orchestrator
            .assign_permission(tenant_role.id, PermissionId::new(1))
            .await
            .unwrap();
        fixture
            .orchestrator
            .unassign_permission(TenantId::new(100), RoleId::new(10), PermissionId::new(1))
            .await
            .unwrap();
        assert_eq!(fixture.orchestrator.total_permission_grants().await.unwrap(), 0);
    }

    // ── User assignment ─────────────────────────────────────────────────

    #[tokio::test]
    async fn double_assign_then_unassign_then_reassign() {
        let fixture = fixture();
        let tenant_role = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        let user = UserId::new(999);

        let grant = fixture.orchestrator.assign_user(tenant_role.id, user).await.unwrap();
        let err = fixture.orchestrator.assign_user(tenant_role.id, user).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateAssociation(_)));

        fixture.orchestrator.delete_user_grant(grant.id).await.unwrap();
        fixture.orchestrator.assign_user(tenant_role.id, user).await.unwrap();
    }

    #[tokio::test]
    async fn unassign_user_with_no_matching_grants_is_not_found() {
        let fixture = fixture();
        let err = fixture
            .orchestrator
            .unassign_user(TenantId::new(100), &[], UserId::new(999))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn unassign_user_removes_grants_and_cleans_up_only_when_orphaned() {
        let fixture = fixture();
        let user = UserId::new(999);
        let editor = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        let reviewer = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(11))
            .await
            .unwrap();
        fixture.orchestrator.assign_user(editor.id, user).await.unwrap();
        fixture.orchestrator.assign_user(reviewer.id, user).await.unwrap();

        // Removing one role leaves the user associated with the tenant,
        // so the active-tenant record stays.
        fixture
            .orchestrator
            .unassign_user(TenantId::new(100), &[RoleId::new(10)], user)
            .await
            .unwrap();
        assert!(fixture.active_tenants.removed().is_empty());

        // Removing the last role triggers the cleanup.
        fixture
            .orchestrator
            .unassign_user(TenantId::new(100), &[], user)
            .await
            .unwrap();
        assert_eq!(fixture.active_tenants.removed(), vec![(user, TenantId::new(100))]);
        assert_eq!(fixture.orchestrator.total_user_grants().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_cleanup_surfaces_as_communication_but_the_deletion_stands() {
        let fixture = fixture_with_active_tenants(Arc::new(RecordingActiveTenantLookup::failing()));
        let user = UserId::new(999);
        let tenant_role = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        fixture.orchestrator.assign_user(tenant_role.id, user).await.unwrap();

        let err = fixture
            .orchestrator
            .unassign_user(TenantId::new(100), &[], user)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Communication(_)));

        // The grant deletion committed before the cleanup failed.
        assert_eq!(fixture.orchestrator.total_user_grants().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn single_grant_delete_runs_the_same_cleanup() {
        let fixture = fixture();
        let user = UserId::new(42);
        let tenant_role = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(200), RoleId::new(10))
            .await
            .unwrap();
        let grant = fixture.orchestrator.assign_user(tenant_role.id, user).await.unwrap();

        fixture.orchestrator.delete_user_grant(grant.id).await.unwrap();
        assert_eq!(fixture.active_tenants.removed(), vec![(user, TenantId::new(200))]);
    }

    // ── Read facade ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn exists_and_get_by_id_reflect_the_store() {
        let fixture = fixture();
        let tenant_role = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();

        assert!(fixture
            .orchestrator
            .tenant_role_exists(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap());
        assert!(!fixture
            .orchestrator
            .tenant_role_exists(TenantId::new(100), RoleId::new(11))
            .await
            .unwrap());

        let fetched = fixture.orchestrator.tenant_role(tenant_role.id).await.unwrap();
        assert_eq!(fetched, tenant_role);

        let err = fixture
            .orchestrator
            .tenant_role(TenantRoleId::new(12345))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn filtered_reads_use_the_predicate_fold() {
        let fixture = fixture();
        fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        fixture
            .orchestrator
            .create_tenant_role(TenantId::new(200), RoleId::new(11))
            .await
            .unwrap();

        let all = fixture
            .orchestrator
            .tenant_roles_filtered(&TenantRoleFilter::new(None, None, true, true))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let none = fixture
            .orchestrator
            .tenant_roles_filtered(&TenantRoleFilter::new(None, None, true, false))
            .await
            .unwrap();
        assert!(none.is_empty());

        let either = fixture
            .orchestrator
            .tenant_roles_filtered(&TenantRoleFilter::new(
                Some(TenantId::new(100)),
                Some(RoleId::new(11)),
                true,
                false,
            ))
            .await
            .unwrap();
        assert_eq!(either.len(), 2);
    }

    #[tokio::test]
    async fn stored_grant_can_be_updated_onto_a_free_key() {
        let fixture = fixture();
        let tenant_role = fixture
            .orchestrator
            .create_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        let grant = fixture
            .orchestrator
            .assign_permission(tenant_role.id, PermissionId::new(1))
            .await
            .unwrap();
        let other = fixture
            .orchestrator
            .assign_permission(tenant_role.id, PermissionId::new(2))
            .await
            .unwrap();

        // Moving onto an occupied key is a duplicate.
        let err = fixture
            .orchestrator
            .update_permission_grant(grant.id, tenant_role.id, PermissionId::new(2))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateAssociation(_)));

        // Moving onto a free key succeeds.
        let updated = fixture
            .orchestrator
            .update_permission_grant(other.id, tenant_role.id, PermissionId::new(3))
            .await
            .unwrap();
        assert_eq!(updated.permission_id, PermissionId::new(3));
    }
}
