//! Audit entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use unitgate_auth::{Action, Decision, Principal, ReasonCode, ResourceKind, ResourceReference, Role, RuleId};
use unitgate_core::{PrincipalId, RequestId, UnitId};

/// Unique id of one audit entry; the idempotency key for retried writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEntryId(pub Uuid);

impl AuditEntryId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Random low bits of the id, used to spread retry jitter.
    pub fn jitter_seed(&self) -> u64 {
        self.0.as_u64_pair().1
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable record of one authorization decision.
///
/// Created right after `decide` returns, for allows and denials alike. Once
/// written it is never updated or deleted by application code; retention is
/// handled out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: AuditEntryId,
    pub request_id: RequestId,
    pub principal_id: PrincipalId,
    pub role: Option<Role>,
    pub resource_kind: ResourceKind,
    pub owner_unit_id: Option<UnitId>,
    pub action: Action,
    pub allowed: bool,
    pub reason_code: ReasonCode,
    pub rule_id: RuleId,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn from_decision(
        decision: &Decision,
        principal: &Principal,
        resource: &ResourceReference,
        action: Action,
        request_id: RequestId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: AuditEntryId::new(),
            request_id,
            principal_id: principal.id,
            role: principal.role,
            resource_kind: resource.kind,
            owner_unit_id: resource.owner_unit_id,
            action,
            allowed: decision.allowed,
            reason_code: decision.reason_code,
            rule_id: decision.rule_id,
            timestamp,
        }
    }

    /// The decision this entry records.
    pub fn decision(&self) -> Decision {
        Decision {
            allowed: self.allowed,
            reason_code: self.reason_code,
            rule_id: self.rule_id,
        }
    }
}
