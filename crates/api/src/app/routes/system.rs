use axum::{Json, extract::Extension, http::StatusCode};
use serde_json::{Value, json};

use unitgate_auth::{Decision, RuleId};

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// The caller's principal as the engine sees it.
pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> Result<Json<Value>, ApiError> {
    let p = principal.principal();
    if !p.is_authenticated() {
        return Err(ApiError::Denied(Decision::from_rule(RuleId::Unauthenticated)));
    }

    Ok(Json(json!({
        "principal_id": p.id,
        "role": p.role,
        "tier": p.tier(),
        "unit_id": p.unit_id,
    })))
}
