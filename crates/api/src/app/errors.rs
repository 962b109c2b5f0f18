use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use unitgate_auth::{AuthzError, Decision, ReasonCode};
use unitgate_core::RecordId;
use unitgate_infra::audit::AuditEntryId;

use super::records::RecordError;

/// Errors surfaced by handlers, each mapped to one JSON response shape.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("denied: {} ({})", .0.reason_code, .0.rule_id)]
    Denied(Decision),

    #[error(transparent)]
    OwnershipChanged(AuthzError),

    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("audit entry not found: {0}")]
    EntryNotFound(AuditEntryId),

    #[error("{0}")]
    BadRequest(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound(id) => ApiError::NotFound(id),
            RecordError::Ownership(e) => ApiError::OwnershipChanged(e),
            RecordError::Poisoned => ApiError::Internal("record store unavailable".to_string()),
        }
    }
}

/// Status for a denied decision: 401 when the caller is not authenticated, 403 otherwise.
pub fn denial_status(decision: &Decision) -> StatusCode {
    if decision.reason_code == ReasonCode::Unauthenticated {
        StatusCode::UNAUTHORIZED
    } else {
        StatusCode::FORBIDDEN
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Denied(decision) => (
                denial_status(&decision),
                axum::Json(json!({
                    "error": decision.reason_code,
                    "rule_id": decision.rule_id,
                })),
            )
                .into_response(),
            ApiError::OwnershipChanged(e) => json_error(StatusCode::CONFLICT, "OWNERSHIP_CHANGED", e.to_string()),
            ApiError::NotFound(id) => json_error(StatusCode::NOT_FOUND, "not_found", format!("record {id} not found")),
            ApiError::EntryNotFound(id) => {
                json_error(StatusCode::NOT_FOUND, "not_found", format!("audit entry {id} not found"))
            }
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::InvalidCredentials(msg) => json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", msg),
            ApiError::Internal(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
