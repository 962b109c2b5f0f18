//! Append-only audit store boundary.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use unitgate_core::RequestId;

use super::entry::{AuditEntry, AuditEntryId};

/// Result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// An entry with the same `entry_id` is already stored; nothing was written.
    Duplicate,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditStoreError {
    #[error("audit storage unavailable: {0}")]
    Unavailable(String),

    #[error("audit entry could not be encoded: {0}")]
    Encoding(String),
}

/// Append-only audit log.
///
/// There is deliberately no update or delete operation. Implementations must:
/// - treat `append` of an already-stored `entry_id` as a successful no-op
/// - keep entries of one `request_id` in append order
pub trait AuditStore: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> Result<AppendOutcome, AuditStoreError>;

    /// Entries of one request, in append order.
    fn by_request(&self, request_id: RequestId) -> Result<Vec<AuditEntry>, AuditStoreError>;

    /// Most recent entries, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError>;
}

impl<S> AuditStore for Arc<S>
where
    S: AuditStore + ?Sized,
{
    fn append(&self, entry: &AuditEntry) -> Result<AppendOutcome, AuditStoreError> {
        (**self).append(entry)
    }

    fn by_request(&self, request_id: RequestId) -> Result<Vec<AuditEntry>, AuditStoreError> {
        (**self).by_request(request_id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        (**self).recent(limit)
    }
}

#[derive(Debug, Default)]
struct Log {
    entries: Vec<AuditEntry>,
    ids: HashSet<AuditEntryId>,
}

/// In-memory audit store.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    log: RwLock<Log>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.log.read().map(|l| l.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> AuditStoreError {
    AuditStoreError::Unavailable("lock poisoned".to_string())
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, entry: &AuditEntry) -> Result<AppendOutcome, AuditStoreError> {
        let mut log = self.log.write().map_err(|_| poisoned())?;
        if !log.ids.insert(entry.entry_id) {
            return Ok(AppendOutcome::Duplicate);
        }
        log.entries.push(entry.clone());
        Ok(AppendOutcome::Appended)
    }

    fn by_request(&self, request_id: RequestId) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let log = self.log.read().map_err(|_| poisoned())?;
        Ok(log
            .entries
            .iter()
            .filter(|e| e.request_id == request_id)
            .cloned()
            .collect())
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let log = self.log.read().map_err(|_| poisoned())?;
        Ok(log.entries.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::test_support::entry_for;

    #[test]
    fn duplicate_entry_ids_are_ignored() {
        let store = InMemoryAuditStore::new();
        let entry = entry_for(RequestId::new());

        assert_eq!(store.append(&entry).unwrap(), AppendOutcome::Appended);
        assert_eq!(store.append(&entry).unwrap(), AppendOutcome::Duplicate);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn by_request_keeps_append_order() {
        let store = InMemoryAuditStore::new();
        let request = RequestId::new();
        let first = entry_for(request);
        let other = entry_for(RequestId::new());
        let second = entry_for(request);

        for e in [&first, &other, &second] {
            store.append(e).unwrap();
        }

        let ids: Vec<_> = store.by_request(request).unwrap().into_iter().map(|e| e.entry_id).collect();
        assert_eq!(ids, vec![first.entry_id, second.entry_id]);
    }

    #[test]
    fn recent_is_newest_first() {
        let store = InMemoryAuditStore::new();
        let a = entry_for(RequestId::new());
        let b = entry_for(RequestId::new());
        store.append(&a).unwrap();
        store.append(&b).unwrap();

        let recent = store.recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].entry_id, b.entry_id);
    }
}
