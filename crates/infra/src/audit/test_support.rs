//! Shared fixtures for audit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;

use unitgate_auth::{Action, Principal, ResourceKind, ResourceReference, Role, decide};
use unitgate_core::{PrincipalId, RequestId, UnitId};

use super::entry::AuditEntry;
use super::store::{AppendOutcome, AuditStore, AuditStoreError, InMemoryAuditStore};

pub fn entry_for(request_id: RequestId) -> AuditEntry {
    let unit = UnitId::new();
    let principal = Principal::new(PrincipalId::new(), Role::Professor, Some(unit));
    let resource = ResourceReference::owned(ResourceKind::DailyLog, unit);
    let decision = decide(&principal, &resource, Action::Write);
    AuditEntry::from_decision(&decision, &principal, &resource, Action::Write, request_id, Utc::now())
}

/// Store that can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: InMemoryAuditStore,
    failing: AtomicBool,
    pub append_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl AuditStore for FlakyStore {
    fn append(&self, entry: &AuditEntry) -> Result<AppendOutcome, AuditStoreError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditStoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.append(entry)
    }

    fn by_request(&self, request_id: RequestId) -> Result<Vec<AuditEntry>, AuditStoreError> {
        self.inner.by_request(request_id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        self.inner.recent(limit)
    }
}
