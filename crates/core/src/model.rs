//! Association records.
//!
//! These are the only rows this engine owns. External entities (tenant,
//! role, permission, user) appear as ids only; their attributes live in
//! other bounded contexts.

use serde::{Deserialize, Serialize};

use crate::id::{PermissionId, RoleId, TenantId, TenantRoleId, TenantRolePermissionId, TenantRoleUserId, UserId};

/// "Role R is grantable within Tenant T".
///
/// Invariant: `(tenant_id, role_id)` is unique across all rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRole {
    pub id: TenantRoleId,
    pub tenant_id: TenantId,
    pub role_id: RoleId,
}

/// "Permission P is granted under TenantRole TR".
///
/// Invariant: `(tenant_role_id, permission_id)` is unique. Leaf of the
/// graph; deletable without further checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRolePermission {
    pub id: TenantRolePermissionId,
    pub tenant_role_id: TenantRoleId,
    pub permission_id: PermissionId,
}

/// "User U holds TenantRole TR".
///
/// Invariant: `(tenant_role_id, user_id)` is unique. Deleting the last
/// row for a (user, tenant) pair triggers active-tenant cleanup in the
/// orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRoleUser {
    pub id: TenantRoleUserId,
    pub tenant_role_id: TenantRoleId,
    pub user_id: UserId,
}
