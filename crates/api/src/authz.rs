//! Enforcement guard: decide, audit, then allow or refuse.
//!
//! Two entry points share one path:
//! - [`enforce`] for handlers that must load the record (and its owner) first
//! - [`route_guard`] middleware for routes whose resource is fixed
//!
//! A denied request never reaches the protected handler body.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use unitgate_auth::{Action, Decision, Principal, ResourceReference, decide};
use unitgate_core::RequestId;
use unitgate_infra::audit::AuditRecorder;

use crate::app::errors::ApiError;
use crate::context::{PrincipalContext, RequestContext};

/// Decide and record. Denials come back as [`ApiError::Denied`].
pub fn enforce(
    recorder: &AuditRecorder,
    principal: &Principal,
    resource: &ResourceReference,
    action: Action,
    request_id: RequestId,
) -> Result<Decision, ApiError> {
    let decision = decide(principal, resource, action);
    recorder.record(&decision, principal, resource, action, request_id);
    if decision.allowed {
        Ok(decision)
    } else {
        Err(ApiError::Denied(decision))
    }
}

/// Fixed resource/action requirement for a route.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    pub resource: ResourceReference,
    pub action: Action,
    pub recorder: AuditRecorder,
}

impl RouteGuard {
    pub fn new(resource: ResourceReference, action: Action, recorder: AuditRecorder) -> Self {
        Self {
            resource,
            action,
            recorder,
        }
    }
}

pub async fn route_guard(State(guard): State<RouteGuard>, req: Request, next: Next) -> Response {
    let principal = req
        .extensions()
        .get::<PrincipalContext>()
        .map(|p| *p.principal())
        .unwrap_or_else(Principal::anonymous);
    let request_id = req
        .extensions()
        .get::<RequestContext>()
        .map(|c| c.request_id())
        .unwrap_or_default();

    match enforce(&guard.recorder, &principal, &guard.resource, guard.action, request_id) {
        Ok(_) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}
