//! `grantlink-store` — persistence abstraction over the association graph.
//!
//! The [`AssociationStore`] trait owns the three association relations
//! (TenantRole, TenantRolePermission, TenantRoleUser) exclusively; no
//! other component writes to them. Two backends are provided:
//! [`MemoryStore`] for tests/dev and [`PgStore`] for production.
//!
//! Both backends enforce composite-key uniqueness at the storage level,
//! so two racing inserts of the same key always resolve to one success
//! and one [`EngineError::DuplicateAssociation`] regardless of whether
//! the proactive guard check caught the conflict first.

use async_trait::async_trait;

use grantlink_core::{
    EngineResult, Page, PageRequest, PermissionGrantFilter, PermissionId, RoleId, TenantId, TenantRole,
    TenantRoleFilter, TenantRoleId, TenantRolePermission, TenantRolePermissionId, TenantRoleUser, TenantRoleUserId,
    UserGrantFilter, UserId,
};

#[cfg(doc)]
use grantlink_core::EngineError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence primitives over the three association relations.
///
/// All list operations return rows in ascending id order (stable paging).
/// `*_conflicts` methods implement the uniqueness-guard primitive: true
/// when at least one row *other than* `exclude` carries the composite
/// key. Methods take `&self`; implementations must be safe for
/// concurrent use from many request-handling tasks.
#[async_trait]
pub trait AssociationStore: Send + Sync {
    // ── TenantRole ──────────────────────────────────────────────────────

    async fn tenant_role_by_id(&self, id: TenantRoleId) -> EngineResult<Option<TenantRole>>;

    /// Resolve the surrogate id for a (tenant, role) pair.
    async fn tenant_role_id_for(&self, tenant_id: TenantId, role_id: RoleId)
        -> EngineResult<Option<TenantRoleId>>;

    /// Batch point lookup, skipping ids that do not exist.
    async fn tenant_roles_by_ids(&self, ids: &[TenantRoleId]) -> EngineResult<Vec<TenantRole>>;

    /// Paged list with optional equality pre-filters (always ANDed).
    async fn tenant_roles_paged(
        &self,
        tenant_id: Option<TenantId>,
        role_id: Option<RoleId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRole>>;

    /// Filtered list under the AND/OR predicate fold.
    async fn tenant_roles_filtered(&self, filter: &TenantRoleFilter) -> EngineResult<Vec<TenantRole>>;

    /// Uniqueness primitive: does another row carry (tenant, role)?
    async fn tenant_role_conflicts(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        exclude: Option<TenantRoleId>,
    ) -> EngineResult<bool>;

    async fn insert_tenant_role(&self, tenant_id: TenantId, role_id: RoleId) -> EngineResult<TenantRole>;

    /// Replace tenant/role of an existing row. `NotFound` if the id is gone.
    async fn update_tenant_role(&self, record: &TenantRole) -> EngineResult<()>;

    /// Returns false when no row had the given id.
    async fn delete_tenant_role(&self, id: TenantRoleId) -> EngineResult<bool>;

    async fn count_tenant_roles(&self) -> EngineResult<u64>;

    // ── TenantRolePermission ────────────────────────────────────────────

    async fn permission_grant_by_id(&self, id: TenantRolePermissionId)
        -> EngineResult<Option<TenantRolePermission>>;

    async fn permission_grant_id_for(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
    ) -> EngineResult<Option<TenantRolePermissionId>>;

    async fn permission_grants_paged(
        &self,
        tenant_role_id: Option<TenantRoleId>,
        permission_id: Option<PermissionId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRolePermission>>;

    async fn permission_grants_filtered(
        &self,
        filter: &PermissionGrantFilter,
    ) -> EngineResult<Vec<TenantRolePermission>>;

    /// All grants under any of the given tenant roles. An empty slice
    /// means "no tenant-role constraint" (every grant).
    async fn permission_grants_for(&self, tenant_role_ids: &[TenantRoleId])
        -> EngineResult<Vec<TenantRolePermission>>;

    async fn permission_grant_conflicts(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
        exclude: Option<TenantRolePermissionId>,
    ) -> EngineResult<bool>;

    async fn insert_permission_grant(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
    ) -> EngineResult<TenantRolePermission>;

    async fn update_permission_grant(&self, record: &TenantRolePermission) -> EngineResult<()>;

    async fn delete_permission_grant(&self, id: TenantRolePermissionId) -> EngineResult<bool>;

    async fn count_permission_grants_for(&self, tenant_role_id: TenantRoleId) -> EngineResult<u64>;

    async fn count_permission_grants(&self) -> EngineResult<u64>;

    // ── TenantRoleUser ──────────────────────────────────────────────────

    async fn user_grant_by_id(&self, id: TenantRoleUserId) -> EngineResult<Option<TenantRoleUser>>;

    async fn user_grant_id_for(&self, tenant_role_id: TenantRoleId, user_id: UserId)
        -> EngineResult<Option<TenantRoleUserId>>;

    async fn user_grants_paged(
        &self,
        tenant_role_id: Option<TenantRoleId>,
        user_id: Option<UserId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRoleUser>>;

    async fn user_grants_filtered(&self, filter: &UserGrantFilter) -> EngineResult<Vec<TenantRoleUser>>;

    /// Grants under any of the given tenant roles, optionally narrowed to
    /// one user. An empty slice means "no tenant-role constraint".
    async fn user_grants_for(
        &self,
        tenant_role_ids: &[TenantRoleId],
        user_id: Option<UserId>,
    ) -> EngineResult<Vec<TenantRoleUser>>;

    /// Ids of user-grant rows joining TenantRole on tenant (+ optional
    /// role set) for one user. Backs bulk unassignment.
    async fn user_grant_ids_for(
        &self,
        tenant_id: TenantId,
        role_ids: &[RoleId],
        user_id: UserId,
    ) -> EngineResult<Vec<TenantRoleUserId>>;

    /// Paged distinct user ids reachable from an optional (tenant, role).
    async fn user_ids_paged(
        &self,
        tenant_id: Option<TenantId>,
        role_id: Option<RoleId>,
        page: PageRequest,
    ) -> EngineResult<Page<UserId>>;

    /// Does the user still hold any TenantRole under the tenant? Backs
    /// the active-tenant cleanup decision.
    async fn user_has_tenant_association(&self, user_id: UserId, tenant_id: TenantId) -> EngineResult<bool>;

    async fn user_grant_conflicts(
        &self,
        tenant_role_id: TenantRoleId,
        user_id: UserId,
        exclude: Option<TenantRoleUserId>,
    ) -> EngineResult<bool>;

    async fn insert_user_grant(&self, tenant_role_id: TenantRoleId, user_id: UserId)
        -> EngineResult<TenantRoleUser>;

    async fn update_user_grant(&self, record: &TenantRoleUser) -> EngineResult<()>;

    async fn delete_user_grant(&self, id: TenantRoleUserId) -> EngineResult<bool>;

    /// Bulk delete; returns false when no row matched any id.
    async fn delete_user_grants(&self, ids: &[TenantRoleUserId]) -> EngineResult<bool>;

    async fn count_user_grants_for(&self, tenant_role_id: TenantRoleId) -> EngineResult<u64>;

    async fn count_user_grants(&self) -> EngineResult<u64>;
}

/// Composite-key descriptions used in duplicate errors, shared by both
/// backends so callers see one message per key regardless of backend.
pub(crate) mod keys {
    pub const TENANT_ROLE: &str = "tenant_id and role_id";
    pub const PERMISSION_GRANT: &str = "tenant_role_id and permission_id";
    pub const USER_GRANT: &str = "tenant_role_id and user_id";
}
