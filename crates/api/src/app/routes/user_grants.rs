//! TenantRoleUser resource: assign/unassign plus the read surface.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use grantlink_core::{EngineError, RoleId, TenantId, TenantRoleId, TenantRoleUserId, UserGrantFilter, UserId};

use crate::app::dto::{require, FindQuery, PagedListQuery, UnassignUserRequest, UserGrantRequest};
use crate::app::{errors, AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/", axum::routing::post(assign).get(list))
        .route("/unassign", axum::routing::post(unassign))
        .route("/find", get(find))
        .route("/count", get(count))
        .route("/user-ids", get(user_ids))
        .route("/:id", get(get_by_id).put(update).delete(delete_by_id))
}

fn pair(body: &UserGrantRequest) -> Result<(TenantRoleId, UserId), EngineError> {
    Ok((
        TenantRoleId::new(require(body.tenant_role_id, "tenant role id")?),
        UserId::new(require(body.user_id, "user id")?),
    ))
}

pub async fn assign(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<UserGrantRequest>,
) -> axum::response::Response {
    let (tenant_role_id, user_id) = match pair(&body) {
        Ok(pair) => pair,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services.orchestrator.assign_user(tenant_role_id, user_id).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Bulk unassignment of one user under a tenant, optionally narrowed to
/// a role set. Carries a body rather than query parameters because of
/// the role-id list.
pub async fn unassign(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<UnassignUserRequest>,
) -> axum::response::Response {
    let parsed = require(body.tenant_id, "tenant id")
        .and_then(|tenant| Ok((TenantId::new(tenant), UserId::new(require(body.user_id, "user id")?))));
    let (tenant_id, user_id) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return errors::engine_error_to_response(e),
    };
    let role_ids: Vec<RoleId> = body.role_ids.iter().copied().map(RoleId::new).collect();
    match services.orchestrator.unassign_user(tenant_id, &role_ids, user_id).await {
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
        .user_grants_paged(
            query.tenant_role_id.map(TenantRoleId::new),
            query.user_id.map(UserId::new),
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
    let filter = UserGrantFilter::new(
        query.tenant_role_id.map(TenantRoleId::new),
        query.user_id.map(UserId::new),
        query.is_exact,
        query.is_conjunction,
    );
    match services.orchestrator.user_grants_filtered(&filter).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn count(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.orchestrator.total_user_grants().await {
        Ok(total) => Json(serde_json::json!({ "total": total })).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Paged distinct user ids reachable from an optional (tenant, role).
pub async fn user_ids(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<PagedListQuery>,
) -> axum::response::Response {
    match services
        .orchestrator
        .user_ids_paged(
            query.tenant_id.map(TenantId::new),
            query.role_id.map(RoleId::new),
            query.request(),
        )
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services.orchestrator.user_grant(TenantRoleUserId::new(id)).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
    Json(body): Json<UserGrantRequest>,
) -> axum::response::Response {
    let (tenant_role_id, user_id) = match pair(&body) {
        Ok(pair) => pair,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services
        .orchestrator
        .update_user_grant(TenantRoleUserId::new(id), tenant_role_id, user_id)
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
    match services.orchestrator.delete_user_grant(TenantRoleUserId::new(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
