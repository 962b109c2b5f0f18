//! Authorization introspection endpoints.
//!
//! `taxonomy` is public and mounted by `build_app`; the rest sit behind auth.
//!
//! - `GET /authz/taxonomy`: roles by tier, resource kinds by category
//! - `POST /authz/explain`: full rule trace of one decision for the caller
//! - `POST /authz/controls`: UI control states for a batch of actions

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    routing::post,
};
use serde_json::{Value, json};

use unitgate_auth::{DecisionExplanation, ResourceKind, ResourceReference, RuleId, Tier, decide, explain};

use crate::app::dto::{ControlResponse, ControlsRequest, ExplainRequest, ResourceKindView, ResourceQuery, TierView};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, RequestContext};
use crate::gating;

pub fn router() -> Router {
    Router::new()
        .route("/explain", post(explain_decision))
        .route("/controls", post(controls))
}

pub async fn taxonomy() -> Json<Value> {
    let tiers: Vec<TierView> = Tier::ALL
        .into_iter()
        .map(|tier| TierView {
            tier,
            unit_scoped: tier.is_unit_scoped(),
            roles: tier.roles().map(|r| r.as_str()).collect(),
        })
        .collect();
    let kinds: Vec<ResourceKindView> = ResourceKind::ALL
        .into_iter()
        .map(|kind| ResourceKindView {
            kind,
            category: kind.category(),
        })
        .collect();

    Json(json!({ "tiers": tiers, "resource_kinds": kinds }))
}

/// Resolve a query to the reference the engine decides on.
///
/// A stored record always contributes its own owner; a caller-supplied owner
/// is only used for bare kinds.
fn resolve(services: &AppServices, query: &ResourceQuery) -> Result<ResourceReference, ApiError> {
    match query.record_id {
        Some(id) => services.records.reference(query.kind, id).ok_or(ApiError::NotFound(id)),
        None => Ok(ResourceReference {
            kind: query.kind,
            owner_unit_id: query.owner_unit_id,
        }),
    }
}

/// POST /authz/explain
///
/// A stored record in another unit is reported as missing, so the endpoint
/// cannot be used to learn which unit owns it.
pub async fn explain_decision(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(req): Json<ExplainRequest>,
) -> Result<Json<DecisionExplanation>, ApiError> {
    let resource = resolve(&services, &req.resource)?;
    let explanation = explain(principal.principal(), &resource, req.action);
    match req.resource.record_id {
        Some(id) if explanation.decision.rule_id == RuleId::CrossUnit => Err(ApiError::NotFound(id)),
        _ => Ok(Json(explanation)),
    }
}

/// POST /authz/controls
pub async fn controls(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<ControlsRequest>,
) -> Result<Json<Vec<ControlResponse>>, ApiError> {
    let principal = principal.principal();
    let mut out = Vec::with_capacity(req.controls.len());

    for control in req.controls {
        let resource = resolve(&services, &control.resource)?;
        let decision = decide(principal, &resource, control.action);
        services
            .recorder
            .record(&decision, principal, &resource, control.action, ctx.request_id());

        out.push(ControlResponse {
            kind: control.resource.kind,
            record_id: control.resource.record_id,
            action: control.action,
            state: gating::render(&decision, services.gating),
        });
    }

    Ok(Json(out))
}
