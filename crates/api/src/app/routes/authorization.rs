//! Read-side authorization questions.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use grantlink_core::{PermissionId, RoleId, TenantId, UserId};

use crate::app::dto::{
    require, HasAnyRoleRequest, HasPermissionQuery, PermissionsForQuery, RolesForQuery, TenantsForQuery,
};
use crate::app::{errors, AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/permissions", get(permissions_for))
        .route("/tenants", get(tenants_for))
        .route("/roles", get(roles_for))
        .route("/has-any-role", axum::routing::post(has_any_role))
        .route("/has-permission", get(has_permission))
}

pub async fn permissions_for(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<PermissionsForQuery>,
) -> axum::response::Response {
    let parsed = require(query.tenant_id, "tenant id")
        .and_then(|tenant| Ok((TenantId::new(tenant), RoleId::new(require(query.role_id, "role id")?))));
    let (tenant_id, role_id) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services
        .queries
        .permission_ids_for(tenant_id, role_id, query.user_id.map(UserId::new))
        .await
    {
        Ok(ids) => Json(ids).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn tenants_for(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<TenantsForQuery>,
) -> axum::response::Response {
    let user_id = match require(query.user_id, "user id") {
        Ok(user) => UserId::new(user),
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services.queries.tenant_ids_for(user_id, query.role_id.map(RoleId::new)).await {
        Ok(ids) => Json(ids).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn roles_for(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<RolesForQuery>,
) -> axum::response::Response {
    let parsed = require(query.user_id, "user id")
        .and_then(|user| Ok((UserId::new(user), TenantId::new(require(query.tenant_id, "tenant id")?))));
    let (user_id, tenant_id) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services.queries.role_ids_for(user_id, tenant_id).await {
        Ok(ids) => Json(ids).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Role names travel in a body; an empty list is a precondition
/// violation, not "no".
pub async fn has_any_role(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<HasAnyRoleRequest>,
) -> axum::response::Response {
    let user_id = match require(body.user_id, "user id") {
        Ok(user) => UserId::new(user),
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services
        .queries
        .has_any_role(user_id, &body.role_names, body.tenant_id.map(TenantId::new))
        .await
    {
        Ok(granted) => Json(serde_json::json!({ "granted": granted })).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn has_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<HasPermissionQuery>,
) -> axum::response::Response {
    let parsed = require(query.user_id, "user id").and_then(|user| {
        Ok((
            UserId::new(user),
            PermissionId::new(require(query.permission_id, "permission id")?),
        ))
    });
    let (user_id, permission_id) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services
        .queries
        .has_permission(user_id, permission_id, query.tenant_id.map(TenantId::new))
        .await
    {
        Ok(granted) => Json(serde_json::json!({ "granted": granted })).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
