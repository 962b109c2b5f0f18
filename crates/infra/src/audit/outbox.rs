//! Outbox for audit entries whose direct write failed.
//!
//! Every state change is expressed as an [`OutboxRecord`] and applied through
//! [`OutboxState::apply`], so the in-memory outbox and the file journal share
//! one state machine: the journal just persists the records before applying them.
//!
//! Ordering: only the oldest pending entry of each request is ever claimable,
//! so entries of one request reach the store in the order they were recorded.
//! A dead-lettered entry keeps blocking its request until it is requeued, and
//! a requeued entry goes back in front of its request's later entries.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use unitgate_core::RequestId;

use super::entry::{AuditEntry, AuditEntryId};
use super::retry::RetryPolicy;

/// A deferred entry waiting for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxItem {
    pub entry: AuditEntry,
    /// Failed delivery attempts so far (the initial direct write is not counted).
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: String,
}

/// An entry that exhausted its retries. Kept until an operator requeues it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub item: OutboxItem,
    pub dead_lettered_at: DateTime<Utc>,
}

/// What happened to an entry after a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    RetryScheduled {
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
    },
    DeadLettered {
        attempts: u32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub pending: usize,
    pub dead_lettered: usize,
    pub delivered_total: u64,
}

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("outbox entry not found: {0}")]
    NotFound(AuditEntryId),

    #[error("outbox already holds entry {0}")]
    AlreadyQueued(AuditEntryId),

    #[error("outbox journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("outbox journal record is corrupt: {0}")]
    Corrupt(String),

    #[error("outbox lock poisoned")]
    Poisoned,
}

/// Durable queue of deferred audit entries.
pub trait AuditOutbox: Send + Sync {
    fn enqueue(&self, entry: AuditEntry, reason: String) -> Result<(), OutboxError>;

    /// Whether any entry of `request_id` is still undelivered, dead letters included.
    fn has_pending(&self, request_id: RequestId) -> Result<bool, OutboxError>;

    /// Up to `limit` entries ready at `now`, oldest first, at most one per request.
    fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OutboxItem>, OutboxError>;

    fn mark_delivered(&self, entry_id: AuditEntryId) -> Result<(), OutboxError>;

    fn mark_failed(
        &self,
        entry_id: AuditEntryId,
        error: String,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, OutboxError>;

    fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, OutboxError>;

    /// Move a dead-lettered entry back to pending with a fresh attempt budget.
    fn requeue_dead_letter(&self, entry_id: AuditEntryId, now: DateTime<Utc>) -> Result<(), OutboxError>;

    fn stats(&self) -> Result<OutboxStats, OutboxError>;
}

impl<O> AuditOutbox for std::sync::Arc<O>
where
    O: AuditOutbox + ?Sized,
{
    fn enqueue(&self, entry: AuditEntry, reason: String) -> Result<(), OutboxError> {
        (**self).enqueue(entry, reason)
    }

    fn has_pending(&self, request_id: RequestId) -> Result<bool, OutboxError> {
        (**self).has_pending(request_id)
    }

    fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OutboxItem>, OutboxError> {
        (**self).claim_ready(now, limit)
    }

    fn mark_delivered(&self, entry_id: AuditEntryId) -> Result<(), OutboxError> {
        (**self).mark_delivered(entry_id)
    }

    fn mark_failed(
        &self,
        entry_id: AuditEntryId,
        error: String,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, OutboxError> {
        (**self).mark_failed(entry_id, error, policy, now)
    }

    fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, OutboxError> {
        (**self).dead_letters(limit)
    }

    fn requeue_dead_letter(&self, entry_id: AuditEntryId, now: DateTime<Utc>) -> Result<(), OutboxError> {
        (**self).requeue_dead_letter(entry_id, now)
    }

    fn stats(&self) -> Result<OutboxStats, OutboxError> {
        (**self).stats()
    }
}

/// A single state transition of the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutboxRecord {
    Enqueued {
        item: OutboxItem,
    },
    Delivered {
        entry_id: AuditEntryId,
    },
    RetryScheduled {
        entry_id: AuditEntryId,
        attempts: u32,
        error: String,
        next_attempt_at: DateTime<Utc>,
    },
    DeadLettered {
        entry_id: AuditEntryId,
        attempts: u32,
        error: String,
        at: DateTime<Utc>,
    },
    Requeued {
        entry_id: AuditEntryId,
        at: DateTime<Utc>,
    },
}

/// Outbox contents; pending items are kept in enqueue order.
#[derive(Debug, Clone, Default)]
pub struct OutboxState {
    pending: Vec<OutboxItem>,
    dead: Vec<DeadLetterEntry>,
    delivered_total: u64,
}

impl OutboxState {
    fn pending_index(&self, entry_id: AuditEntryId) -> Result<usize, OutboxError> {
        self.pending
            .iter()
            .position(|i| i.entry.entry_id == entry_id)
            .ok_or(OutboxError::NotFound(entry_id))
    }

    fn dead_index(&self, entry_id: AuditEntryId) -> Result<usize, OutboxError> {
        self.dead
            .iter()
            .position(|d| d.item.entry.entry_id == entry_id)
            .ok_or(OutboxError::NotFound(entry_id))
    }

    fn contains(&self, entry_id: AuditEntryId) -> bool {
        self.pending_index(entry_id).is_ok() || self.dead_index(entry_id).is_ok()
    }

    pub fn plan_enqueue(&self, entry: AuditEntry, reason: String, now: DateTime<Utc>) -> Result<OutboxRecord, OutboxError> {
        if self.contains(entry.entry_id) {
            return Err(OutboxError::AlreadyQueued(entry.entry_id));
        }
        Ok(OutboxRecord::Enqueued {
            item: OutboxItem {
                entry,
                attempts: 0,
                enqueued_at: now,
                next_attempt_at: now,
                last_error: reason,
            },
        })
    }

    pub fn plan_delivered(&self, entry_id: AuditEntryId) -> Result<OutboxRecord, OutboxError> {
        self.pending_index(entry_id)?;
        Ok(OutboxRecord::Delivered { entry_id })
    }

    pub fn plan_failure(
        &self,
        entry_id: AuditEntryId,
        error: String,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<(OutboxRecord, FailureOutcome), OutboxError> {
        let item = &self.pending[self.pending_index(entry_id)?];
        let attempts = item.attempts + 1;

        if policy.should_retry(attempts) {
            let delay = policy.delay_for_attempt(attempts, entry_id.jitter_seed());
            let delay = chrono::Duration::from_std(delay).unwrap_or_default();
            let next_attempt_at = now + delay;
            Ok((
                OutboxRecord::RetryScheduled {
                    entry_id,
                    attempts,
                    error,
                    next_attempt_at,
                },
                FailureOutcome::RetryScheduled {
                    attempts,
                    next_attempt_at,
                },
            ))
        } else {
            Ok((
                OutboxRecord::DeadLettered {
                    entry_id,
                    attempts,
                    error,
                    at: now,
                },
                FailureOutcome::DeadLettered { attempts },
            ))
        }
    }

    pub fn plan_requeue(&self, entry_id: AuditEntryId, now: DateTime<Utc>) -> Result<OutboxRecord, OutboxError> {
        self.dead_index(entry_id)?;
        Ok(OutboxRecord::Requeued { entry_id, at: now })
    }

    /// Apply a transition. Records referring to unknown entries are rejected.
    pub fn apply(&mut self, record: &OutboxRecord) -> Result<(), OutboxError> {
        match record {
            OutboxRecord::Enqueued { item } => {
                if self.contains(item.entry.entry_id) {
                    return Err(OutboxError::AlreadyQueued(item.entry.entry_id));
                }
                self.pending.push(item.clone());
            }
            OutboxRecord::Delivered { entry_id } => {
                let idx = self.pending_index(*entry_id)?;
                self.pending.remove(idx);
                self.delivered_total += 1;
            }
            OutboxRecord::RetryScheduled {
                entry_id,
                attempts,
                error,
                next_attempt_at,
            } => {
                let idx = self.pending_index(*entry_id)?;
                let item = &mut self.pending[idx];
                item.attempts = *attempts;
                item.last_error = error.clone();
                item.next_attempt_at = *next_attempt_at;
            }
            OutboxRecord::DeadLettered {
                entry_id,
                attempts,
                error,
                at,
            } => {
                let idx = self.pending_index(*entry_id)?;
                let mut item = self.pending.remove(idx);
                item.attempts = *attempts;
                item.last_error = error.clone();
                self.dead.push(DeadLetterEntry {
                    item,
                    dead_lettered_at: *at,
                });
            }
            OutboxRecord::Requeued { entry_id, at } => {
                let idx = self.dead_index(*entry_id)?;
                let mut item = self.dead.remove(idx).item;
                item.attempts = 0;
                item.next_attempt_at = *at;
                let request_id = item.entry.request_id;
                match self.pending.iter().position(|i| i.entry.request_id == request_id) {
                    Some(first) => self.pending.insert(first, item),
                    None => self.pending.push(item),
                }
            }
        }
        Ok(())
    }

    pub fn has_pending(&self, request_id: RequestId) -> bool {
        self.pending.iter().any(|i| i.entry.request_id == request_id)
            || self.dead.iter().any(|d| d.item.entry.request_id == request_id)
    }

    pub fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Vec<OutboxItem> {
        // Requests with a dead letter stay blocked until it is requeued.
        let mut seen: HashSet<RequestId> = self.dead.iter().map(|d| d.item.entry.request_id).collect();
        let mut ready = Vec::new();
        for item in &self.pending {
            if ready.len() >= limit {
                break;
            }
            // Only the head of each request's queue is eligible.
            if !seen.insert(item.entry.request_id) {
                continue;
            }
            if item.next_attempt_at <= now {
                ready.push(item.clone());
            }
        }
        ready
    }

    pub fn dead_letters(&self, limit: usize) -> Vec<DeadLetterEntry> {
        self.dead.iter().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> OutboxStats {
        OutboxStats {
            pending: self.pending.len(),
            dead_lettered: self.dead.len(),
            delivered_total: self.delivered_total,
        }
    }

    /// Records that rebuild the current contents from scratch (used for journal compaction).
    pub fn snapshot_records(&self) -> Vec<OutboxRecord> {
        let mut records: Vec<OutboxRecord> = self
            .dead
            .iter()
            .flat_map(|d| {
                [
                    OutboxRecord::Enqueued { item: d.item.clone() },
                    OutboxRecord::DeadLettered {
                        entry_id: d.item.entry.entry_id,
                        attempts: d.item.attempts,
                        error: d.item.last_error.clone(),
                        at: d.dead_lettered_at,
                    },
                ]
            })
            .collect();
        records.extend(
            self.pending
                .iter()
                .map(|item| OutboxRecord::Enqueued { item: item.clone() }),
        );
        records
    }
}

/// In-memory outbox.
///
/// Not durable across restarts; use `FileAuditOutbox` in deployments.
#[derive(Debug, Default)]
pub struct InMemoryAuditOutbox {
    state: Mutex<OutboxState>,
}

impl InMemoryAuditOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut OutboxState) -> Result<T, OutboxError>) -> Result<T, OutboxError> {
        let mut state = self.state.lock().map_err(|_| OutboxError::Poisoned)?;
        f(&mut state)
    }
}

impl AuditOutbox for InMemoryAuditOutbox {
    fn enqueue(&self, entry: AuditEntry, reason: String) -> Result<(), OutboxError> {
        self.with_state(|s| {
            let record = s.plan_enqueue(entry, reason, Utc::now())?;
            s.apply(&record)
        })
    }

    fn has_pending(&self, request_id: RequestId) -> Result<bool, OutboxError> {
        self.with_state(|s| Ok(s.has_pending(request_id)))
    }

    fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OutboxItem>, OutboxError> {
        self.with_state(|s| Ok(s.claim_ready(now, limit)))
    }

    fn mark_delivered(&self, entry_id: AuditEntryId) -> Result<(), OutboxError> {
        self.with_state(|s| {
            let record = s.plan_delivered(entry_id)?;
            s.apply(&record)
        })
    }

    fn mark_failed(
        &self,
        entry_id: AuditEntryId,
        error: String,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, OutboxError> {
        self.with_state(|s| {
            let (record, outcome) = s.plan_failure(entry_id, error, policy, now)?;
            s.apply(&record)?;
            Ok(outcome)
        })
    }

    fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, OutboxError> {
        self.with_state(|s| Ok(s.dead_letters(limit)))
    }

    fn requeue_dead_letter(&self, entry_id: AuditEntryId, now: DateTime<Utc>) -> Result<(), OutboxError> {
        self.with_state(|s| {
            let record = s.plan_requeue(entry_id, now)?;
            s.apply(&record)
        })
    }

    fn stats(&self) -> Result<OutboxStats, OutboxError> {
        self.with_state(|s| Ok(s.stats()))
    }
}
