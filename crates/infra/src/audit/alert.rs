//! Operator alerts for audit delivery problems.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{error, warn};

use unitgate_core::RequestId;

use super::entry::AuditEntryId;

/// Something an operator should know about audit durability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditAlert {
    /// Direct write failed (or was held back for ordering); entry is in the outbox.
    WriteDeferred {
        entry_id: AuditEntryId,
        request_id: RequestId,
        reason: String,
    },
    /// Retries exhausted; entry parked in the dead-letter queue.
    DeadLettered {
        entry_id: AuditEntryId,
        request_id: RequestId,
        attempts: u32,
        last_error: String,
    },
    /// Neither the store nor the outbox accepted the entry.
    EntryLost {
        entry_id: AuditEntryId,
        request_id: RequestId,
        store_error: String,
        outbox_error: String,
    },
}

impl AuditAlert {
    pub fn entry_id(&self) -> AuditEntryId {
        match self {
            AuditAlert::WriteDeferred { entry_id, .. }
            | AuditAlert::DeadLettered { entry_id, .. }
            | AuditAlert::EntryLost { entry_id, .. } => *entry_id,
        }
    }
}

pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: AuditAlert);
}

impl<A> AlertSink for std::sync::Arc<A>
where
    A: AlertSink + ?Sized,
{
    fn alert(&self, alert: AuditAlert) {
        (**self).alert(alert)
    }
}

/// Emits alerts as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, alert: AuditAlert) {
        match &alert {
            AuditAlert::WriteDeferred {
                entry_id,
                request_id,
                reason,
            } => warn!(
                alert = "audit.write_deferred",
                entry_id = %entry_id,
                request_id = %request_id,
                reason = %reason,
                "audit entry deferred to outbox"
            ),
            AuditAlert::DeadLettered {
                entry_id,
                request_id,
                attempts,
                last_error,
            } => error!(
                alert = "audit.dead_lettered",
                entry_id = %entry_id,
                request_id = %request_id,
                attempts,
                last_error = %last_error,
                "audit entry dead-lettered"
            ),
            AuditAlert::EntryLost {
                entry_id,
                request_id,
                store_error,
                outbox_error,
            } => error!(
                alert = "audit.entry_lost",
                entry_id = %entry_id,
                request_id = %request_id,
                store_error = %store_error,
                outbox_error = %outbox_error,
                "audit entry could not be persisted"
            ),
        }
    }
}

/// Collects alerts in memory.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<AuditAlert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<AuditAlert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

impl AlertSink for MemoryAlertSink {
    fn alert(&self, alert: AuditAlert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}
