//! TenantRole resource: create/update/delete plus the read surface.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use grantlink_core::{EngineError, RoleId, TenantId, TenantRoleFilter, TenantRoleId};

use crate::app::dto::{require, ExistsQuery, FindQuery, PagedListQuery, TenantRoleRequest};
use crate::app::{errors, AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/", axum::routing::post(create).get(list))
        .route("/find", get(find))
        .route("/exists", get(exists))
        .route("/count", get(count))
        .route("/:id", get(get_by_id).put(update).delete(delete_by_id))
}

fn pair(body: &TenantRoleRequest) -> Result<(TenantId, RoleId), EngineError> {
    Ok((
        TenantId::new(require(body.tenant_id, "tenant id")?),
        RoleId::new(require(body.role_id, "role id")?),
    ))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<TenantRoleRequest>,
) -> axum::response::Response {
    let (tenant_id, role_id) = match pair(&body) {
        Ok(pair) => pair,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services.orchestrator.create_tenant_role(tenant_id, role_id).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<PagedListQuery>,
) -> axum::response::Response {
    match services
        .orchestrator
        .tenant_roles_paged(
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

pub async fn find(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<FindQuery>,
) -> axum::response::Response {
    let filter = TenantRoleFilter::new(
        query.tenant_id.map(TenantId::new),
        query.role_id.map(RoleId::new),
        query.is_exact,
        query.is_conjunction,
    );
    match services.orchestrator.tenant_roles_filtered(&filter).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn exists(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ExistsQuery>,
) -> axum::response::Response {
    let pair = require(query.tenant_id, "tenant id")
        .and_then(|tenant| Ok((tenant, require(query.role_id, "role id")?)));
    let (tenant_id, role_id) = match pair {
        Ok((tenant, role)) => (TenantId::new(tenant), RoleId::new(role)),
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services.orchestrator.tenant_role_exists(tenant_id, role_id).await {
        Ok(found) => Json(serde_json::json!({ "exists": found })).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn count(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.orchestrator.total_tenant_roles().await {
        Ok(total) => Json(serde_json::json!({ "total": total })).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services.orchestrator.tenant_role(TenantRoleId::new(id)).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
    Json(body): Json<TenantRoleRequest>,
) -> axum::response::Response {
    let (tenant_id, role_id) = match pair(&body) {
        Ok(pair) => pair,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services
        .orchestrator
        .update_tenant_role(TenantRoleId::new(id), tenant_id, role_id)
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
    match services.orchestrator.delete_tenant_role(TenantRoleId::new(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
