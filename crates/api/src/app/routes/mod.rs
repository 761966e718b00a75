use axum::Router;

pub mod authorization;
pub mod permission_grants;
pub mod system;
pub mod tenant_roles;
pub mod user_grants;

/// Router for the full operation surface of the association engine.
pub fn router() -> Router {
    Router::new()
        .nest("/tenant-roles", tenant_roles::router())
        .nest("/permission-grants", permission_grants::router())
        .nest("/user-grants", user_grants::router())
        .nest("/authorization", authorization::router())
}
