//! Read-side authorization questions over the association graph.
//!
//! All operations are pure reads composed from store primitives; they
//! take no locks and run in parallel with writes, so answers are
//! point-in-time snapshots. A precondition violation (missing mandatory
//! parameter) is an error, never an empty result; an empty result always
//! means a true empty join.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::instrument;

use grantlink_core::{EngineError, EngineResult, PermissionId, RoleId, TenantId, TenantRoleId, UserId};
use grantlink_store::AssociationStore;

use crate::lookup::RoleLookup;

/// Answers the transitive authorization questions.
///
/// Role names are owned by another bounded context, so `has_any_role`
/// resolves them to ids through the injected [`RoleLookup`] and then
/// joins locally.
#[derive(Clone)]
pub struct AuthorizationQueryEngine {
    store: Arc<dyn AssociationStore>,
    roles: Arc<dyn RoleLookup>,
}

impl AuthorizationQueryEngine {
    pub fn new(store: Arc<dyn AssociationStore>, roles: Arc<dyn RoleLookup>) -> Self {
        Self { store, roles }
    }

    /// Permission ids granted under TenantRole(tenant, role).
    ///
    /// With a user given, the result is non-empty only when that user
    /// actually holds the TenantRole; a user without a grant gets an
    /// empty set, not an error.
    #[instrument(skip(self), err)]
    pub async fn permission_ids_for(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        user_id: Option<UserId>,
    ) -> EngineResult<Vec<PermissionId>> {
        let Some(tenant_role_id) = self.store.tenant_role_id_for(tenant_id, role_id).await? else {
            return Ok(Vec::new());
        };
        if let Some(user_id) = user_id {
            if self.store.user_grant_id_for(tenant_role_id, user_id).await?.is_none() {
                return Ok(Vec::new());
            }
        }
        let grants = self.store.permission_grants_for(&[tenant_role_id]).await?;
        Ok(grants.into_iter().map(|grant| grant.permission_id).collect())
    }

    /// Distinct tenant ids where the user holds any role, optionally
    /// narrowed to one role.
    #[instrument(skip(self), err)]
    pub async fn tenant_ids_for(&self, user_id: UserId, role_id: Option<RoleId>) -> EngineResult<Vec<TenantId>> {
        let tenant_roles = self.tenant_roles_held_by(user_id).await?;
        let tenants: BTreeSet<TenantId> = tenant_roles
            .iter()
            .filter(|tenant_role| role_id.is_none_or(|role| tenant_role.role_id == role))
            .map(|tenant_role| tenant_role.tenant_id)
            .collect();
        Ok(tenants.into_iter().collect())
    }

    /// Distinct role ids the user holds under the tenant.
    #[instrument(skip(self), err)]
    pub async fn role_ids_for(&self, user_id: UserId, tenant_id: TenantId) -> EngineResult<Vec<RoleId>> {
        let tenant_roles = self.tenant_roles_held_by(user_id).await?;
        let roles: BTreeSet<RoleId> = tenant_roles
            .iter()
            .filter(|tenant_role| tenant_role.tenant_id == tenant_id)
            .map(|tenant_role| tenant_role.role_id)
            .collect();
        Ok(roles.into_iter().collect())
    }

    /// Does the user hold any of the named roles, optionally under one
    /// tenant? Empty `role_names` is a precondition violation; names
    /// that resolve to no known role answer false.
    #[instrument(skip(self, role_names), fields(role_count = role_names.len()), err)]
    pub async fn has_any_role(
        &self,
        user_id: UserId,
        role_names: &[String],
        tenant_id: Option<TenantId>,
    ) -> EngineResult<bool> {
        if role_names.is_empty() {
            return Err(EngineError::missing("role names"));
        }
        let role_ids = self.roles.ids_for_names(role_names).await?;
        if role_ids.is_empty() {
            return Ok(false);
        }
        match tenant_id {
            Some(tenant_id) => {
                let grants = self.store.user_grant_ids_for(tenant_id, &role_ids, user_id).await?;
                Ok(!grants.is_empty())
            }
            None => {
                let tenant_roles = self.tenant_roles_held_by(user_id).await?;
                Ok(tenant_roles
                    .iter()
                    .any(|tenant_role| role_ids.contains(&tenant_role.role_id)))
            }
        }
    }

    /// Does the user hold the permission through any of their tenant
    /// roles, optionally restricted to one tenant?
    #[instrument(skip(self), err)]
    pub async fn has_permission(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
        tenant_id: Option<TenantId>,
    ) -> EngineResult<bool> {
        let tenant_roles = self.tenant_roles_held_by(user_id).await?;
        let tenant_role_ids: Vec<TenantRoleId> = tenant_roles
            .iter()
            .filter(|tenant_role| tenant_id.is_none_or(|tenant| tenant_role.tenant_id == tenant))
            .map(|tenant_role| tenant_role.id)
            .collect();
        // An empty id set would mean "unconstrained" to the store, so
        // short-circuit: no tenant roles, no permissions.
        if tenant_role_ids.is_empty() {
            return Ok(false);
        }
        let grants = self.store.permission_grants_for(&tenant_role_ids).await?;
        Ok(grants.iter().any(|grant| grant.permission_id == permission_id))
    }

    /// The TenantRole rows the user holds a grant for.
    async fn tenant_roles_held_by(&self, user_id: UserId) -> EngineResult<Vec<grantlink_core::TenantRole>> {
        let grants = self.store.user_grants_for(&[], Some(user_id)).await?;
        if grants.is_empty() {
            return Ok(Vec::new());
        }
        let tenant_role_ids: Vec<TenantRoleId> = grants.iter().map(|grant| grant.tenant_role_id).collect();
        self.store.tenant_roles_by_ids(&tenant_role_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::StaticRoleLookup;
    use grantlink_store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        query: AuthorizationQueryEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let roles = Arc::new(StaticRoleLookup::with_roles([(10, "publisher"), (11, "editor")]));
        let query = AuthorizationQueryEngine::new(store.clone(), roles);
        Fixture { store, query }
    }

    /// tenant 100, role 10 ("publisher"), permissions 1..3, user 999.
    async fn publisher_setup(fixture: &Fixture) -> TenantRoleId {
        let tenant_role = fixture
            .store
            .insert_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        for permission in 1..=3 {
            fixture
                .store
                .insert_permission_grant(tenant_role.id, PermissionId::new(permission))
                .await
                .unwrap();
        }
        fixture
            .store
            .insert_user_grant(tenant_role.id, UserId::new(999))
            .await
            .unwrap();
        tenant_role.id
    }

    #[tokio::test]
    async fn permission_ids_without_user_return_every_grant() {
        let fixture = fixture();
        publisher_setup(&fixture).await;

        let mut ids = fixture
            .query
            .permission_ids_for(TenantId::new(100), RoleId::new(10), None)
            .await
            .unwrap();
        ids.sort();
        assert_eq!(ids, vec![PermissionId::new(1), PermissionId::new(2), PermissionId::new(3)]);
    }

    #[tokio::test]
    async fn permission_ids_with_granted_user_match_the_ungated_set() {
        let fixture = fixture();
        publisher_setup(&fixture).await;

        let mut ids = fixture
            .query
            .permission_ids_for(TenantId::new(100), RoleId::new(10), Some(UserId::new(999)))
            .await
            .unwrap();
        ids.sort();
        assert_eq!(ids, vec![PermissionId::new(1), PermissionId::new(2), PermissionId::new(3)]);
    }

    #[tokio::test]
    async fn permission_ids_with_unrelated_user_are_empty_not_an_error() {
        let fixture = fixture();
        publisher_setup(&fixture).await;

        let ids = fixture
            .query
            .permission_ids_for(TenantId::new(100), RoleId::new(10), Some(UserId::new(888)))
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn permission_ids_for_missing_tenant_role_are_empty() {
        let fixture = fixture();
        let ids = fixture
            .query
            .permission_ids_for(TenantId::new(1), RoleId::new(2), None)
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn tenant_and_role_ids_are_distinct() {
        let fixture = fixture();
        let user = UserId::new(999);
        let first = fixture
            .store
            .insert_tenant_role(TenantId::new(100), RoleId::new(10))
            .await
            .unwrap();
        let second = fixture
            .store
            .insert_tenant_role(TenantId::new(100), RoleId::new(11))
            .await
            .unwrap();
        let third = fixture
            .store
            .insert_tenant_role(TenantId::new(200), RoleId::new(10))
            .await
            .unwrap();
        for tenant_role in [first.id, second.id, third.id] {
            fixture.store.insert_user_grant(tenant_role, user).await.unwrap();
        }

        let tenants = fixture.query.tenant_ids_for(user, None).await.unwrap();
        assert_eq!(tenants, vec![TenantId::new(100), TenantId::new(200)]);

        let tenants = fixture.query.tenant_ids_for(user, Some(RoleId::new(11))).await.unwrap();
        assert_eq!(tenants, vec![TenantId::new(100)]);

        let roles = fixture.query.role_ids_for(user, TenantId::new(100)).await.unwrap();
        assert_eq!(roles, vec![RoleId::new(10), RoleId::new(11)]);
    }

    #[tokio::test]
    async fn has_any_role_with_empty_names_is_a_missing_parameter() {
        let fixture = fixture();
        let err = fixture
            .query
            .has_any_role(UserId::new(999), &[], Some(TenantId::new(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingParameter(_)));
    }

    #[tokio::test]
    async fn has_any_role_answers_per_tenant_and_globally() {
        let fixture = fixture();
        publisher_setup(&fixture).await;
        let user = UserId::new(999);
        let names = vec!["publisher".to_string()];

        assert!(fixture
            .query
            .has_any_role(user, &names, Some(TenantId::new(100)))
            .await
            .unwrap());
        assert!(!fixture
            .query
            .has_any_role(user, &names, Some(TenantId::new(200)))
            .await
            .unwrap());
        assert!(fixture.query.has_any_role(user, &names, None).await.unwrap());

        // A name no role carries is false, not an error.
        assert!(!fixture
            .query
            .has_any_role(user, &["ghost".to_string()], None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn has_permission_follows_the_user_grants() {
        let fixture = fixture();
        publisher_setup(&fixture).await;
        let user = UserId::new(999);

        assert!(fixture
            .query
            .has_permission(user, PermissionId::new(2), Some(TenantId::new(100)))
            .await
            .unwrap());
        assert!(fixture.query.has_permission(user, PermissionId::new(2), None).await.unwrap());
        assert!(!fixture
            .query
            .has_permission(user, PermissionId::new(9), None)
            .await
            .unwrap());
        assert!(!fixture
            .query
            .has_permission(UserId::new(888), PermissionId::new(2), None)
            .await
            .unwrap());
    }
}
