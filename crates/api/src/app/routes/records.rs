//! Unit-owned records.
//!
//! Every handler decides on the owner read from the store, never on an owner
//! supplied by the client, and mutations hand the granted reference back to
//! the store so ownership is re-checked under the write lock.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use unitgate_auth::{Action, ResourceKind, ResourceReference};
use unitgate_core::RecordId;

use crate::app::dto::{CreateRecordRequest, TransferRecordRequest, UpdateRecordRequest};
use crate::app::errors::ApiError;
use crate::app::records::Record;
use crate::app::services::AppServices;
use crate::authz::enforce;
use crate::context::{PrincipalContext, RequestContext};

pub fn router() -> Router {
    Router::new()
        .route("/:kind", post(create_record))
        .route("/:kind/:id", get(get_record).put(update_record).delete(delete_record))
        .route("/:kind/:id/transfer", post(transfer_record))
}

fn parse_kind(raw: &str) -> Result<ResourceKind, ApiError> {
    raw.parse().map_err(|e: unitgate_auth::UnknownResourceKind| ApiError::bad_request(e.to_string()))
}

fn parse_id(raw: &str) -> Result<RecordId, ApiError> {
    raw.parse().map_err(|e: unitgate_core::DomainError| ApiError::bad_request(e.to_string()))
}

/// Load the record and its authoritative reference.
fn load(services: &AppServices, kind: &str, id: &str) -> Result<(Record, ResourceReference), ApiError> {
    let kind = parse_kind(kind)?;
    let id = parse_id(id)?;
    let record = services.records.get(kind, id).ok_or(ApiError::NotFound(id))?;
    let reference = record.reference();
    Ok((record, reference))
}

/// POST /records/:kind
pub async fn create_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(ctx): Extension<RequestContext>,
    Path(kind): Path<String>,
    Json(req): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let kind = parse_kind(&kind)?;
    let principal = principal.principal();

    let owner = match req.owner_unit_id.or(principal.unit_id) {
        Some(owner) => owner,
        None => {
            // Nothing to own it: decide on the bare kind so the denial (or
            // allowance) is still produced by the engine and audited.
            enforce(
                &services.recorder,
                principal,
                &ResourceReference::unowned(kind),
                Action::Write,
                ctx.request_id(),
            )?;
            return Err(ApiError::bad_request("owner_unit_id is required"));
        }
    };

    enforce(
        &services.recorder,
        principal,
        &ResourceReference::owned(kind, owner),
        Action::Write,
        ctx.request_id(),
    )?;

    let record = services.records.insert(kind, owner, req.data)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /records/:kind/:id
pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Record>, ApiError> {
    let (record, reference) = load(&services, &kind, &id)?;
    enforce(&services.recorder, principal.principal(), &reference, Action::Read, ctx.request_id())?;
    Ok(Json(record))
}

/// PUT /records/:kind/:id
pub async fn update_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
    Json(req): Json<UpdateRecordRequest>,
) -> Result<Json<Record>, ApiError> {
    let (record, granted) = load(&services, &kind, &id)?;
    enforce(&services.recorder, principal.principal(), &granted, Action::Write, ctx.request_id())?;
    let updated = services.records.update(record.id, &granted, req.data)?;
    Ok(Json(updated))
}

/// DELETE /records/:kind/:id
pub async fn delete_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (record, granted) = load(&services, &kind, &id)?;
    enforce(&services.recorder, principal.principal(), &granted, Action::Delete, ctx.request_id())?;
    services.records.delete(record.id, &granted)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /records/:kind/:id/transfer
///
/// Needs a `Write` on the record in its current unit and a `Write` on the same
/// kind in the destination unit.
pub async fn transfer_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
    Json(req): Json<TransferRecordRequest>,
) -> Result<Json<Record>, ApiError> {
    let (record, granted) = load(&services, &kind, &id)?;
    let principal = principal.principal();
    enforce(&services.recorder, principal, &granted, Action::Write, ctx.request_id())?;
    enforce(
        &services.recorder,
        principal,
        &ResourceReference::owned(record.kind, req.to_unit_id),
        Action::Write,
        ctx.request_id(),
    )?;
    let moved = services.records.transfer(record.id, &granted, req.to_unit_id)?;
    Ok(Json(moved))
}
