//! In-memory association store for tests and development.
//!
//! Rows live in id-ordered maps behind one `RwLock`. Inserts re-check the
//! composite key under the write lock, which is what makes this backend
//! honor the storage-level uniqueness backstop: of two racing inserts for
//! the same key, exactly one wins.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;

use grantlink_core::{
    EngineError, EngineResult, Page, PageRequest, PermissionGrantFilter, PermissionId, RoleId, TenantId, TenantRole,
    TenantRoleFilter, TenantRoleId, TenantRolePermission, TenantRolePermissionId, TenantRoleUser, TenantRoleUserId,
    UserGrantFilter, UserId,
};

use crate::{keys, AssociationStore};

#[derive(Debug, Default)]
struct State {
    tenant_roles: BTreeMap<i64, TenantRole>,
    permission_grants: BTreeMap<i64, TenantRolePermission>,
    user_grants: BTreeMap<i64, TenantRoleUser>,
    next_tenant_role_id: i64,
    next_permission_grant_id: i64,
    next_user_grant_id: i64,
}

/// RwLock'd in-memory backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, State>> {
        self.inner
            .read()
            .map_err(|_| EngineError::storage("memory store lock poisoned"))
    }

    fn write(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.inner
            .write()
            .map_err(|_| EngineError::storage("memory store lock poisoned"))
    }
}

fn page_slice<T: Clone>(rows: Vec<T>, page: PageRequest) -> Page<T> {
    let total = rows.len() as u64;
    let items: Vec<T> = rows
        .into_iter()
        .skip(page.offset())
        .take(page.size as usize)
        .collect();
    Page::new(items, page, total)
}

#[async_trait]
impl AssociationStore for MemoryStore {
    // ── TenantRole ──────────────────────────────────────────────────────

    async fn tenant_role_by_id(&self, id: TenantRoleId) -> EngineResult<Option<TenantRole>> {
        Ok(self.read()?.tenant_roles.get(&id.value()).copied())
    }

    async fn tenant_role_id_for(&self, tenant_id: TenantId, role_id: RoleId)
        -> EngineResult<Option<TenantRoleId>>
    {
        Ok(self
            .read()?
            .tenant_roles
            .values()
            .find(|row| row.tenant_id == tenant_id && row.role_id == role_id)
            .map(|row| row.id))
    }

    async fn tenant_roles_by_ids(&self, ids: &[TenantRoleId]) -> EngineResult<Vec<TenantRole>> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.tenant_roles.get(&id.value()).copied())
            .collect())
    }

    async fn tenant_roles_paged(
        &self,
        tenant_id: Option<TenantId>,
        role_id: Option<RoleId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRole>> {
        let rows: Vec<TenantRole> = self
            .read()?
            .tenant_roles
            .values()
            .filter(|row| tenant_id.is_none_or(|t| row.tenant_id == t))
            .filter(|row| role_id.is_none_or(|r| row.role_id == r))
            .copied()
            .collect();
        Ok(page_slice(rows, page))
    }

    async fn tenant_roles_filtered(&self, filter: &TenantRoleFilter) -> EngineResult<Vec<TenantRole>> {
        let predicate = filter.predicate();
        Ok(self
            .read()?
            .tenant_roles
            .values()
            .filter(|row| predicate.matches(row))
            .copied()
            .collect())
    }

    async fn tenant_role_conflicts(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        exclude: Option<TenantRoleId>,
    ) -> EngineResult<bool> {
        Ok(self.read()?.tenant_roles.values().any(|row| {
            row.tenant_id == tenant_id && row.role_id == role_id && exclude != Some(row.id)
        }))
    }

    async fn insert_tenant_role(&self, tenant_id: TenantId, role_id: RoleId) -> EngineResult<TenantRole> {
        let mut state = self.write()?;
        // Storage-level backstop, checked under the write lock.
        if state
            .tenant_roles
            .values()
            .any(|row| row.tenant_id == tenant_id && row.role_id == role_id)
        {
            return Err(EngineError::duplicate(keys::TENANT_ROLE));
        }
        state.next_tenant_role_id += 1;
        let record = TenantRole {
            id: TenantRoleId::new(state.next_tenant_role_id),
            tenant_id,
            role_id,
        };
        state.tenant_roles.insert(record.id.value(), record);
        Ok(record)
    }

    async fn update_tenant_role(&self, record: &TenantRole) -> EngineResult<()> {
        let mut state = self.write()?;
        if state.tenant_roles.values().any(|row| {
            row.tenant_id == record.tenant_id && row.role_id == record.role_id && row.id != record.id
        }) {
            return Err(EngineError::duplicate(keys::TENANT_ROLE));
        }
        match state.tenant_roles.get_mut(&record.id.value()) {
            Some(row) => {
                *row = *record;
                Ok(())
            }
            None => Err(EngineError::not_found(format!("tenant role {}", record.id))),
        }
    }

    async fn delete_tenant_role(&self, id: TenantRoleId) -> EngineResult<bool> {
        Ok(self.write()?.tenant_roles.remove(&id.value()).is_some())
    }

    async fn count_tenant_roles(&self) -> EngineResult<u64> {
        Ok(self.read()?.tenant_roles.len() as u64)
    }

    // ── TenantRolePermission ────────────────────────────────────────────

    async fn permission_grant_by_id(&self, id: TenantRolePermissionId)
        -> EngineResult<Option<TenantRolePermission>>
    {
        Ok(self.read()?.permission_grants.get(&id.value()).copied())
    }

    async fn permission_grant_id_for(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
    ) -> EngineResult<Option<TenantRolePermissionId>> {
        Ok(self
            .read()?
            .permission_grants
            .values()
            .find(|row| row.tenant_role_id == tenant_role_id && row.permission_id == permission_id)
            .map(|row| row.id))
    }

    async fn permission_grants_paged(
        &self,
        tenant_role_id: Option<TenantRoleId>,
        permission_id: Option<PermissionId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRolePermission>> {
        let rows: Vec<TenantRolePermission> = self
            .read()?
            .permission_grants
            .values()
            .filter(|row| tenant_role_id.is_none_or(|tr| row.tenant_role_id == tr))
            .filter(|row| permission_id.is_none_or(|p| row.permission_id == p))
            .copied()
            .collect();
        Ok(page_slice(rows, page))
    }

    async fn permission_grants_filtered(
        &self,
        filter: &PermissionGrantFilter,
    ) -> EngineResult<Vec<TenantRolePermission>> {
        let predicate = filter.predicate();
        Ok(self
            .read()?
            .permission_grants
            .values()
            .filter(|row| predicate.matches(row))
            .copied()
            .collect())
    }

    async fn permission_grants_for(&self, tenant_role_ids: &[TenantRoleId])
        -> EngineResult<Vec<TenantRolePermission>>
    {
        let wanted: BTreeSet<i64> = tenant_role_ids.iter().map(|id| id.value()).collect();
        Ok(self
            .read()?
            .permission_grants
            .values()
            .filter(|row| wanted.is_empty() || wanted.contains(&row.tenant_role_id.value()))
            .copied()
            .collect())
    }

    async fn permission_grant_conflicts(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
        exclude: Option<TenantRolePermissionId>,
    ) -> EngineResult<bool> {
        Ok(self.read()?.permission_grants.values().any(|row| {
            row.tenant_role_id == tenant_role_id
                && row.permission_id == permission_id
                && exclude != Some(row.id)
        }))
    }

    async fn insert_permission_grant(
        &self,
        tenant_role_id: TenantRoleId,
        permission_id: PermissionId,
    ) -> EngineResult<TenantRolePermission> {
        let mut state = self.write()?;
        if state
            .permission_grants
            .values()
            .any(|row| row.tenant_role_id == tenant_role_id && row.permission_id == permission_id)
        {
            return Err(EngineError::duplicate(keys::PERMISSION_GRANT));
        }
        state.next_permission_grant_id += 1;
        let record = TenantRolePermission {
            id: TenantRolePermissionId::new(state.next_permission_grant_id),
            tenant_role_id,
            permission_id,
        };
        state.permission_grants.insert(record.id.value(), record);
        Ok(record)
    }

    async fn update_permission_grant(&self, record: &TenantRolePermission) -> EngineResult<()> {
        let mut state = self.write()?;
        if state.permission_grants.values().any(|row| {
            row.tenant_role_id == record.tenant_role_id
                && row.permission_id == record.permission_id
                && row.id != record.id
        }) {
            return Err(EngineError::duplicate(keys::PERMISSION_GRANT));
        }
        match state.permission_grants.get_mut(&record.id.value()) {
            Some(row) => {
                *row = *record;
                Ok(())
            }
            None => Err(EngineError::not_found(format!("tenant role permission {}", record.id))),
        }
    }

    async fn delete_permission_grant(&self, id: TenantRolePermissionId) -> EngineResult<bool> {
        Ok(self.write()?.permission_grants.remove(&id.value()).is_some())
    }

    async fn count_permission_grants_for(&self, tenant_role_id: TenantRoleId) -> EngineResult<u64> {
        Ok(self
            .read()?
            .permission_grants
            .values()
            .filter(|row| row.tenant_role_id == tenant_role_id)
            .count() as u64)
    }

    async fn count_permission_grants(&self) -> EngineResult<u64> {
        Ok(self.read()?.permission_grants.len() as u64)
    }

    // ── TenantRoleUser ──────────────────────────────────────────────────

    async fn user_grant_by_id(&self, id: TenantRoleUserId) -> EngineResult<Option<TenantRoleUser>> {
        Ok(self.read()?.user_grants.get(&id.value()).copied())
    }

    async fn user_grant_id_for(&self, tenant_role_id: TenantRoleId, user_id: UserId)
        -> EngineResult<Option<TenantRoleUserId>>
    {
        Ok(self
            .read()?
            .user_grants
            .values()
            .find(|row| row.tenant_role_id == tenant_role_id && row.user_id == user_id)
            .map(|row| row.id))
    }

    async fn user_grants_paged(
        &self,
        tenant_role_id: Option<TenantRoleId>,
        user_id: Option<UserId>,
        page: PageRequest,
    ) -> EngineResult<Page<TenantRoleUser>> {
        let rows: Vec<TenantRoleUser> = self
            .read()?
            .user_grants
            .values()
            .filter(|row| tenant_role_id.is_none_or(|tr| row.tenant_role_id == tr))
            .filter(|row| user_id.is_none_or(|u| row.user_id == u))
            .copied()
            .collect();
        Ok(page_slice(rows, page))
    }

    async fn user_grants_filtered(&self, filter: &UserGrantFilter) -> EngineResult<Vec<TenantRoleUser>> {
        let predicate = filter.predicate();
        Ok(self
            .read()?
            .user_grants
            .values()
            .filter(|row| predicate.matches(row))
            .copied()
            .collect())
    }

    async fn user_grants_for(
        &self,
        tenant_role_ids: &[TenantRoleId],
        user_id: Option<UserId>,
    ) -> EngineResult<Vec<TenantRoleUser>> {
        let wanted: BTreeSet<i64> = tenant_role_ids.iter().map(|id| id.value()).collect();
        Ok(self
            .read()?
            .user_grants
            .values()
            .filter(|row| wanted.is_empty() || wanted.contains(&row.tenant_role_id.value()))
            .filter(|row| user_id.is_none_or(|u| row.user_id == u))
            .copied()
            .collect())
    }

    async fn user_grant_ids_for(
        &self,
        tenant_id: TenantId,
        role_ids: &[RoleId],
        user_id: UserId,
    ) -> EngineResult<Vec<TenantRoleUserId>> {
        let state = self.read()?;
        let tenant_role_ids: BTreeSet<i64> = state
            .tenant_roles
            .values()
            .filter(|row| row.tenant_id == tenant_id)
            .filter(|row| role_ids.is_empty() || role_ids.contains(&row.role_id))
            .map(|row| row.id.value())
            .collect();
        Ok(state
            .user_grants
            .values()
            .filter(|row| row.user_id == user_id && tenant_role_ids.contains(&row.tenant_role_id.value()))
            .map(|row| row.id)
            .collect())
    }

    async fn user_ids_paged(
        &self,
        tenant_id: Option<TenantId>,
        role_id: Option<RoleId>,
        page: PageRequest,
    ) -> EngineResult<Page<UserId>> {
        let state = self.read()?;
        let tenant_role_ids: Option<BTreeSet<i64>> = if tenant_id.is_some() || role_id.is_some() {
            Some(
                state
                    .tenant_roles
                    .values()
                    .filter(|row| tenant_id.is_none_or(|t| row.tenant_id == t))
                    .filter(|row| role_id.is_none_or(|r| row.role_id == r))
                    .map(|row| row.id.value())
                    .collect(),
            )
        } else {
            None
        };
        let users: BTreeSet<UserId> = state
            .user_grants
            .values()
            .filter(|row| {
                tenant_role_ids
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&row.tenant_role_id.value()))
            })
            .map(|row| row.user_id)
            .collect();
        Ok(page_slice(users.into_iter().collect(), page))
    }

    async fn user_has_tenant_association(&self, user_id: UserId, tenant_id: TenantId) -> EngineResult<bool> {
        let state = self.read()?;
        let tenant_role_ids: BTreeSet<i64> = state
            .tenant_roles
            .values()
            .filter(|row| row.tenant_id == tenant_id)
            .map(|row| row.id.value())
            .collect();
        Ok(state
            .user_grants
            .values()
            .any(|row| row.user_id == user_id && tenant_role_ids.contains(&row.tenant_role_id.value())))
    }

    async fn user_grant_conflicts(
        &self,
        tenant_role_id: TenantRoleId,
        user_id: UserId,
        exclude: Option<TenantRoleUserId>,
    ) -> EngineResult<bool> {
        Ok(self.read()?.user_grants.values().any(|row| {
            row.tenant_role_id == tenant_role_id && row.user_id == user_id && exclude != Some(row.id)
        }))
    }

    async fn insert_user_grant(&self, tenant_role_id: TenantRoleId, user_id: UserId)
        -> EngineResult<TenantRoleUser>
    {
        let mut state = self.write()?;
        if state
            .user_grants
            .values()
            .any(|row| row.tenant_role_id == tenant_role_id && row.user_id == user_id)
        {
            return Err(EngineError::duplicate(keys::USER_GRANT));
        }
        state.next_user_grant_id += 1;
        let record = TenantRoleUser {
            id: TenantRoleUserId::new(state.next_user_grant_id),
            tenant_role_id,
            user_id,
        };
        state.user_grants.insert(record.id.value(), record);
        Ok(record)
    }

    async fn update_user_grant(&self, record: &TenantRoleUser) -> EngineResult<()> {
        let mut state = self.write()?;
        if state.user_grants.values().any(|row| {
            row.tenant_role_id == record.tenant_role_id && row.user_id == record.user_id && row.id != record.id
        }) {
            return Err(EngineError::duplicate(keys::USER_GRANT));
        }
        match state.user_grants.get_mut(&record.id.value()) {
            Some(row) => {
                *row = *record;
                Ok(())
            }
            None => Err(EngineError::not_found(format!("tenant role user {}", record.id))),
        }
    }

    async fn delete_user_grant(&self, id: TenantRoleUserId) -> EngineResult<bool> {
        Ok(self.write()?.user_grants.remove(&id.value()).is_some())
    }

    async fn delete_user_grants(&self, ids: &[TenantRoleUserId]) -> EngineResult<bool> {
        let mut state = self.write()?;
        let mut any = false;
        for id in ids {
            any |= state.user_grants.remove(&id.value()).is_some();
        }
        Ok(any)
    }

    async fn count_user_grants_for(&self, tenant_role_id: TenantRoleId) -> EngineResult<u64> {
        Ok(self
            .read()?
            .user_grants
            .values()
            .filter(|row| row.tenant_role_id == tenant_role_id)
            .count() as u64)
    }

    async fn count_user_grants(&self) -> EngineResult<u64> {
        Ok(self.read()?.user_grants.len() as u64)
    }
}
