//! TenantRolePermission resource: assign/unassign plus the read surface.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use grantlink_core::{
    EngineError, PermissionGrantFilter, PermissionId, RoleId, TenantId, TenantRoleId, TenantRolePermissionId,
};

use crate::app::dto::{require, FindQuery, PagedListQuery, PermissionGrantRequest, UnassignPermissionQuery};
use crate::app::{errors, AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/", axum::routing::post(assign).get(list).delete(unassign))
        .route("/find", get(find))
        .route("/count", get(count))
        .route("/:id", get(get_by_id).put(update).delete(delete_by_id))
}

fn pair(body: &PermissionGrantRequest) -> Result<(TenantRoleId, PermissionId), EngineError> {
    Ok((
        TenantRoleId::new(require(body.tenant_role_id, "tenant role id")?),
        PermissionId::new(require(body.permission_id, "permission id")?),
    ))
}

pub async fn assign(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<PermissionGrantRequest>,
) -> axum::response::Response {
    let (tenant_role_id, permission_id) = match pair(&body) {
        Ok(pair) => pair,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services.orchestrator.assign_permission(tenant_role_id, permission_id).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Unassignment addresses the grant by (tenant, role, permission), not
/// by its surrogate id.
pub async fn unassign(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<UnassignPermissionQuery>,
) -> axum::response::Response {
    let parsed = require(query.tenant_id, "tenant id").and_then(|tenant| {
        Ok((
            TenantId::new(tenant),
            RoleId::new(require(query.role_id, "role id")?),
            PermissionId::new(require(query.permission_id, "permission id")?),
        ))
    });
    let (tenant_id, role_id, permission_id) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services
        .orchestrator
        .unassign_permission(tenant_id, role_id, permission_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<PagedListQuery>,
) -> axum::response::Response {
    match services
        .orchestrator
        .permission_grants_paged(
            query.tenant_role_id.map(TenantRoleId::new),
            query.permission_id.map(PermissionId::new),
            query.request(),
        )
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn find(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<FindQuery>,
) -> axum::response::Response {
    let filter = PermissionGrantFilter::new(
        query.tenant_role_id.map(TenantRoleId::new),
        query.permission_id.map(PermissionId::new),
        query.is_exact,
        query.is_conjunction,
    );
    match services.orchestrator.permission_grants_filtered(&filter).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn count(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.orchestrator.total_permission_grants().await {
        Ok(total) => Json(serde_json::json!({ "total": total })).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services.orchestrator.permission_grant(TenantRolePermissionId::new(id)).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
    Json(body): Json<PermissionGrantRequest>,
) -> axum::response::Response {
    let (tenant_role_id, permission_id) = match pair(&body) {
        Ok(pair) => pair,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services
        .orchestrator
        .update_permission_grant(TenantRolePermissionId::new(id), tenant_role_id, permission_id)
        .await
    {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn delete_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services
        .orchestrator
        .delete_permission_grant(TenantRolePermissionId::new(id))
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
