//! Strongly-typed identifiers used across the association graph.
//!
//! Tenants, roles, permissions and users are owned by other bounded
//! contexts; this engine only ever sees their numeric surrogate ids.

use serde::{Deserialize, Serialize};

/// Identifier of a tenant (owned by the tenant-management context).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(i64);

/// Identifier of a role (owned by the role-management context).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(i64);

/// Identifier of a permission (owned by the permission-management context).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(i64);

/// Identifier of a user (owned by the user-management context).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

/// Surrogate key of a TenantRole association row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantRoleId(i64);

/// Surrogate key of a TenantRolePermission association row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantRolePermissionId(i64);

/// Surrogate key of a TenantRoleUser association row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantRoleUserId(i64);

macro_rules! impl_i64_newtype {
    ($t:ty) => {
        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_i64_newtype!(TenantId);
impl_i64_newtype!(RoleId);
impl_i64_newtype!(PermissionId);
impl_i64_newtype!(UserId);
impl_i64_newtype!(TenantRoleId);
impl_i64_newtype!(TenantRolePermissionId);
impl_i64_newtype!(TenantRoleUserId);
