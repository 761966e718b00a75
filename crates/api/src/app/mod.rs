//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/lookup wiring (Postgres or in-memory)
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/query DTOs and boundary validation
//! - `errors.rs`: consistent error responses and status mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router against the environment-selected backend
/// (public entrypoint used by `main.rs`).
pub async fn build_app() -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services().await?);
    Ok(build_app_with(services))
}

/// Build the router around pre-wired services; tests use this with the
/// in-memory backend.
pub fn build_app_with(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}
