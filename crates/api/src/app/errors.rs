use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use grantlink_core::EngineError;

/// Map the engine taxonomy onto HTTP statuses. Each kind keeps its own
/// machine-readable code so callers can react without parsing messages.
pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        EngineError::MissingParameter(_) => json_error(StatusCode::BAD_REQUEST, "missing_parameter", message),
        EngineError::InvalidReference { .. } => json_error(StatusCode::BAD_REQUEST, "invalid_reference", message),
        EngineError::DuplicateAssociation(_) => json_error(StatusCode::CONFLICT, "duplicate_association", message),
        EngineError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        EngineError::CascadeBlocked { .. } => json_error(StatusCode::CONFLICT, "cascade_blocked", message),
        EngineError::Communication(_) => json_error(StatusCode::BAD_GATEWAY, "communication_failure", message),
        EngineError::Storage(_) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_failure", message),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
