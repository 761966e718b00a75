//! Request/query DTOs and boundary validation.
//!
//! Identifier fields arrive as `Option<i64>` and are promoted to the
//! typed ids here; a missing mandatory field becomes
//! `EngineError::MissingParameter` naming the field, which the error
//! mapper turns into a 400. Nothing below the adapter ever sees a
//! missing mandatory identifier.

use serde::Deserialize;

use grantlink_core::{EngineError, PageRequest};

/// Promote an optional mandatory field, naming it on absence.
pub fn require<T>(value: Option<T>, field: &'static str) -> Result<T, EngineError> {
    value.ok_or_else(|| EngineError::missing(field))
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct TenantRoleRequest {
    pub tenant_id: Option<i64>,
    pub role_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionGrantRequest {
    pub tenant_role_id: Option<i64>,
    pub permission_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserGrantRequest {
    pub tenant_role_id: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UnassignUserRequest {
    pub tenant_id: Option<i64>,
    /// Empty or absent means "every role under the tenant".
    #[serde(default)]
    pub role_ids: Vec<i64>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HasAnyRoleRequest {
    pub user_id: Option<i64>,
    #[serde(default)]
    pub role_names: Vec<String>,
    pub tenant_id: Option<i64>,
}

// -------------------------
// Query DTOs
// -------------------------

/// Page parameters plus the optional equality pre-filters of the paged
/// list endpoints. Each endpoint reads only the filter fields that
/// apply to its relation.
#[derive(Debug, Deserialize)]
pub struct PagedListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub tenant_id: Option<i64>,
    pub role_id: Option<i64>,
    pub tenant_role_id: Option<i64>,
    pub permission_id: Option<i64>,
    pub user_id: Option<i64>,
}

impl PagedListQuery {
    pub fn request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest::new(self.page.unwrap_or(defaults.page), self.size.unwrap_or(defaults.size))
    }
}

fn default_true() -> bool {
    true
}

/// Filtered-search parameters: optional fields folded under the AND/OR
/// flag. `is_exact` only affects string fields and is carried for wire
/// compatibility.
#[derive(Debug, Deserialize)]
pub struct FindQuery {
    pub tenant_id: Option<i64>,
    pub role_id: Option<i64>,
    pub tenant_role_id: Option<i64>,
    pub permission_id: Option<i64>,
    pub user_id: Option<i64>,
    #[serde(default = "default_true")]
    pub is_exact: bool,
    #[serde(default = "default_true")]
    pub is_conjunction: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExistsQuery {
    pub tenant_id: Option<i64>,
    pub role_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UnassignPermissionQuery {
    pub tenant_id: Option<i64>,
    pub role_id: Option<i64>,
    pub permission_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsForQuery {
    pub tenant_id: Option<i64>,
    pub role_id: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TenantsForQuery {
    pub user_id: Option<i64>,
    pub role_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RolesForQuery {
    pub user_id: Option<i64>,
    pub tenant_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HasPermissionQuery {
    pub user_id: Option<i64>,
    pub permission_id: Option<i64>,
    pub tenant_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_names_the_missing_field() {
        let err = require::<i64>(None, "tenant id").unwrap_err();
        assert_eq!(err.to_string(), "mandatory parameter not informed: tenant id");
        assert_eq!(require(Some(7i64), "tenant id").unwrap(), 7);
    }

    #[test]
    fn page_query_falls_back_to_defaults() {
        let query: PagedListQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.request(), PageRequest::new(1, 10));

        let query: PagedListQuery = serde_json::from_str(r#"{"page": 3, "size": 25}"#).unwrap();
        assert_eq!(query.request(), PageRequest::new(3, 25));
    }
}
