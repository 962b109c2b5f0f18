//! Audit trail queries and dead-letter handling.
//!
//! The router sits behind a guard requiring `Read` on `report`. Past that,
//! every entry is decided on its own: a caller sees an entry only if it may
//! read reports of the entry's unit, so unit-scoped roles never see another
//! unit's decisions. Entries without an owner belong to no unit and are shown
//! to strategic roles and to the principal that produced them.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use tracing::info;

use unitgate_auth::{Action, Principal, ResourceKind, ResourceReference, Tier, decide};
use unitgate_infra::audit::{AuditEntry, AuditEntryId, AuditOutbox, AuditStore, DeadLetterEntry, OutboxError};

use crate::app::dto::AuditQuery;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::enforce;
use crate::context::{PrincipalContext, RequestContext};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_entries))
        .route("/dead-letters", get(list_dead_letters))
        .route("/dead-letters/:entry_id/requeue", post(requeue_dead_letter))
}

fn limit(query: &AuditQuery) -> usize {
    query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

/// Whether `principal` may see `entry`.
pub fn entry_visible_to(principal: &Principal, entry: &AuditEntry) -> bool {
    match entry.owner_unit_id {
        Some(owner) => decide(principal, &ResourceReference::owned(ResourceKind::Report, owner), Action::Read).allowed,
        None => entry.principal_id == principal.id || principal.tier() == Some(Tier::Strategic),
    }
}

fn outbox_error(e: OutboxError) -> ApiError {
    match e {
        OutboxError::NotFound(id) => ApiError::EntryNotFound(id),
        other => ApiError::Internal(other.to_string()),
    }
}

/// GET /audit?request_id=&limit=
///
/// `limit` bounds the entries read from the store; filtering happens after.
pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let store = services.recorder.store();
    let entries = match query.request_id {
        Some(request_id) => store.by_request(request_id),
        None => store.recent(limit(&query)),
    }
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let principal = principal.principal();
    Ok(Json(
        entries
            .into_iter()
            .filter(|e| entry_visible_to(principal, e))
            .collect(),
    ))
}

/// GET /audit/dead-letters?limit=
pub async fn list_dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<DeadLetterEntry>>, ApiError> {
    let dead = services.recorder.outbox().dead_letters(limit(&query)).map_err(outbox_error)?;
    let principal = principal.principal();
    Ok(Json(
        dead.into_iter()
            .filter(|d| entry_visible_to(principal, &d.item.entry))
            .collect(),
    ))
}

/// POST /audit/dead-letters/:entry_id/requeue
///
/// Decided as a `Write` on the settings of the entry's unit. Entries the
/// caller cannot see are reported as missing.
pub async fn requeue_dead_letter(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(ctx): Extension<RequestContext>,
    Path(entry_id): Path<AuditEntryId>,
) -> Result<StatusCode, ApiError> {
    let principal = principal.principal();
    let outbox = services.recorder.outbox();

    let dead = outbox
        .dead_letters(usize::MAX)
        .map_err(outbox_error)?
        .into_iter()
        .find(|d| d.item.entry.entry_id == entry_id)
        .filter(|d| entry_visible_to(principal, &d.item.entry))
        .ok_or(ApiError::EntryNotFound(entry_id))?;

    let settings = ResourceReference {
        kind: ResourceKind::UnitSettings,
        owner_unit_id: dead.item.entry.owner_unit_id,
    };
    enforce(&services.recorder, principal, &settings, Action::Write, ctx.request_id())?;

    outbox.requeue_dead_letter(entry_id, Utc::now()).map_err(outbox_error)?;
    info!(
        entry_id = %entry_id,
        principal_id = %principal.id,
        request_id = %ctx.request_id(),
        "dead-lettered audit entry requeued"
    );
    Ok(StatusCode::NO_CONTENT)
}
