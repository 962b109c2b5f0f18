use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::debug;

use unitgate_auth::Principal;
use unitgate_core::RequestId;

use crate::app::errors::ApiError;
use crate::context::{PrincipalContext, REQUEST_ID_HEADER, RequestContext};
use crate::jwt::JwtValidator;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Attach a [`RequestContext`], reusing a well-formed inbound `x-request-id`.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<RequestId>().ok())
        .unwrap_or_default();

    req.extensions_mut().insert(RequestContext::new(request_id));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Build the request's principal.
///
/// No `Authorization` header means an anonymous principal (guards deny it with
/// 401). A header that is present but does not verify is refused right here.
pub async fn auth_middleware(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let principal = match extract_bearer(req.headers()) {
        Ok(None) => Principal::anonymous(),
        Ok(Some(token)) => match state.jwt.validate(token, Utc::now()) {
            Ok(claims) => match Principal::try_from_claims(&claims) {
                Ok(p) => p,
                Err(e) => return ApiError::InvalidCredentials(e.to_string()).into_response(),
            },
            Err(e) => {
                debug!(error = %e, "bearer token rejected");
                return ApiError::InvalidCredentials(e.to_string()).into_response();
            }
        },
        Err(e) => return e.into_response(),
    };

    req.extensions_mut().insert(PrincipalContext::new(principal));
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header
        .to_str()
        .map_err(|_| ApiError::InvalidCredentials("authorization header is not ASCII".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::InvalidCredentials("expected a bearer token".to_string()))?
        .trim();

    if token.is_empty() {
        return Err(ApiError::InvalidCredentials("empty bearer token".to_string()));
    }

    Ok(Some(token))
}
