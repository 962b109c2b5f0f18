//! Audit trail for authorization decisions.
//!
//! Flow: [`AuditRecorder::record`] writes straight to the [`AuditStore`]; on
//! failure the entry goes to the [`AuditOutbox`], and the [`AuditRelay`]
//! delivers it later with retry, backoff and dead-lettering. Problems surface
//! through an [`AlertSink`].

pub mod alert;
pub mod entry;
pub mod journal;
pub mod outbox;
pub mod postgres;
pub mod recorder;
pub mod relay;
pub mod retry;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use alert::{AlertSink, AuditAlert, MemoryAlertSink, TracingAlertSink};
pub use entry::{AuditEntry, AuditEntryId};
pub use journal::FileAuditOutbox;
pub use outbox::{
    AuditOutbox, DeadLetterEntry, FailureOutcome, InMemoryAuditOutbox, OutboxError, OutboxItem, OutboxStats,
};
pub use postgres::{AUDIT_SCHEMA, PostgresAuditStore};
pub use recorder::{AuditRecorder, RecordOutcome};
pub use relay::{AuditRelay, AuditRelayConfig, AuditRelayHandle, DrainReport, RelayStats};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use store::{AppendOutcome, AuditStore, AuditStoreError, InMemoryAuditStore};
