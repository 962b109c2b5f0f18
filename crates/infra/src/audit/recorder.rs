//! Audit recorder: turns every decision into exactly one persisted entry.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use unitgate_auth::{Action, Decision, Principal, ResourceReference};
use unitgate_core::RequestId;

use super::alert::{AlertSink, AuditAlert, TracingAlertSink};
use super::entry::{AuditEntry, AuditEntryId};
use super::outbox::AuditOutbox;
use super::store::{AppendOutcome, AuditStore};

/// Where a recorded entry ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Written(AuditEntryId),
    /// The store already held this entry id.
    Duplicate(AuditEntryId),
    /// Parked in the outbox for the relay to deliver.
    Deferred(AuditEntryId),
    /// Neither store nor outbox accepted the entry; an alert was raised.
    Lost(AuditEntryId),
}

impl RecordOutcome {
    pub fn entry_id(&self) -> AuditEntryId {
        match *self {
            RecordOutcome::Written(id)
            | RecordOutcome::Duplicate(id)
            | RecordOutcome::Deferred(id)
            | RecordOutcome::Lost(id) => id,
        }
    }

    pub fn is_persisted(&self) -> bool {
        !matches!(self, RecordOutcome::Lost(_))
    }
}

/// Records authorization decisions.
///
/// `record` never fails the caller. A failed direct write goes to the outbox;
/// while a request has entries waiting in the outbox, its later entries queue
/// behind them instead of overtaking them.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    outbox: Arc<dyn AuditOutbox>,
    alerts: Arc<dyn AlertSink>,
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>, outbox: Arc<dyn AuditOutbox>) -> Self {
        Self {
            store,
            outbox,
            alerts: Arc::new(TracingAlertSink),
        }
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    pub fn outbox(&self) -> &Arc<dyn AuditOutbox> {
        &self.outbox
    }

    pub fn alerts(&self) -> &Arc<dyn AlertSink> {
        &self.alerts
    }

    pub fn record(
        &self,
        decision: &Decision,
        principal: &Principal,
        resource: &ResourceReference,
        action: Action,
        request_id: RequestId,
    ) -> RecordOutcome {
        let entry = AuditEntry::from_decision(decision, principal, resource, action, request_id, Utc::now());

        if decision.allowed {
            debug!(
                request_id = %request_id,
                principal_id = %principal.id,
                resource_kind = %resource.kind,
                action = %action,
                rule_id = %decision.rule_id,
                "authorization allowed"
            );
        } else {
            info!(
                request_id = %request_id,
                principal_id = %principal.id,
                resource_kind = %resource.kind,
                action = %action,
                reason_code = %decision.reason_code,
                rule_id = %decision.rule_id,
                "authorization denied"
            );
        }

        self.persist(entry)
    }

    /// Persist an already-built entry (same path as `record`).
    pub fn persist(&self, entry: AuditEntry) -> RecordOutcome {
        match self.outbox.has_pending(entry.request_id) {
            Ok(true) => return self.defer(entry, "earlier entry of this request is still pending".to_string()),
            Ok(false) => {}
            Err(e) => {
                // Ordering cannot be checked; a direct write still beats losing the entry.
                warn!(request_id = %entry.request_id, error = %e, "audit outbox unreadable");
            }
        }

        match self.store.append(&entry) {
            Ok(AppendOutcome::Appended) => RecordOutcome::Written(entry.entry_id),
            Ok(AppendOutcome::Duplicate) => RecordOutcome::Duplicate(entry.entry_id),
            Err(e) => self.defer(entry, e.to_string()),
        }
    }

    fn defer(&self, entry: AuditEntry, reason: String) -> RecordOutcome {
        let entry_id = entry.entry_id;
        let request_id = entry.request_id;
        match self.outbox.enqueue(entry, reason.clone()) {
            Ok(()) => {
                self.alerts.alert(AuditAlert::WriteDeferred {
                    entry_id,
                    request_id,
                    reason,
                });
                RecordOutcome::Deferred(entry_id)
            }
            Err(e) => {
                self.alerts.alert(AuditAlert::EntryLost {
                    entry_id,
                    request_id,
                    store_error: reason,
                    outbox_error: e.to_string(),
                });
                RecordOutcome::Lost(entry_id)
            }
        }
    }
}
