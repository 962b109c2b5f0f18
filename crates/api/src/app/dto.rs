use serde::{Deserialize, Serialize};

use unitgate_auth::{Action, ResourceKind, Tier};
use unitgate_core::{RecordId, RequestId, UnitId};

use crate::gating::ControlState;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    /// Defaults to the caller's own unit.
    pub owner_unit_id: Option<UnitId>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct TransferRecordRequest {
    pub to_unit_id: UnitId,
}

/// Target of an explain/controls query: a stored record, or a bare kind with an optional owner.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceQuery {
    pub kind: ResourceKind,
    pub record_id: Option<RecordId>,
    pub owner_unit_id: Option<UnitId>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    #[serde(flatten)]
    pub resource: ResourceQuery,
    pub action: Action,
}

#[derive(Debug, Deserialize)]
pub struct ControlQuery {
    #[serde(flatten)]
    pub resource: ResourceQuery,
    pub action: Action,
}

#[derive(Debug, Deserialize)]
pub struct ControlsRequest {
    pub controls: Vec<ControlQuery>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub request_id: Option<RequestId>,
    pub limit: Option<usize>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub kind: ResourceKind,
    pub record_id: Option<RecordId>,
    pub action: Action,
    #[serde(flatten)]
    pub state: ControlState,
}

#[derive(Debug, Serialize)]
pub struct TierView {
    pub tier: Tier,
    pub unit_scoped: bool,
    pub roles: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ResourceKindView {
    pub kind: ResourceKind,
    pub category: unitgate_auth::ResourceCategory,
}
