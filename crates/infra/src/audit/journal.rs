//! File-backed audit outbox.
//!
//! Layout: one JSON-encoded [`OutboxRecord`] per line. Every mutation appends
//! its record and syncs the file before the in-memory state changes, so a
//! crash never loses an acknowledged enqueue. On open the journal is replayed
//! and rewritten with only the records needed to rebuild the live contents.
//!
//! A torn final line (crash mid-write) is dropped with a warning; corruption
//! anywhere else fails the open. While open, the file is cut back to the last
//! committed byte before every append, so a failed write never merges with the
//! next record.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use unitgate_core::RequestId;

use super::entry::{AuditEntry, AuditEntryId};
use super::outbox::{
    AuditOutbox, DeadLetterEntry, FailureOutcome, OutboxError, OutboxItem, OutboxRecord, OutboxState, OutboxStats,
};
use super::retry::RetryPolicy;

#[derive(Debug)]
struct Journal {
    file: File,
    /// Length of the file up to the end of the last committed record.
    committed_len: u64,
    state: OutboxState,
}

impl Journal {
    fn commit(&mut self, record: OutboxRecord) -> Result<(), OutboxError> {
        let mut line = serde_json::to_vec(&record).map_err(|e| OutboxError::Corrupt(e.to_string()))?;
        line.push(b'\n');

        if let Err(e) = self.append_line(&line) {
            if let Err(trunc) = self.file.set_len(self.committed_len) {
                warn!(error = %trunc, "outbox journal rollback failed, retrying on next append");
            }
            return Err(e.into());
        }
        self.committed_len += line.len() as u64;
        self.state.apply(&record)
    }

    fn append_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        let on_disk = self.file.metadata()?.len();
        if on_disk != self.committed_len {
            warn!(
                on_disk,
                committed = self.committed_len,
                "discarding uncommitted bytes at outbox journal tail"
            );
            self.file.set_len(self.committed_len)?;
        }
        self.file.write_all(line)?;
        self.file.flush()?;
        self.file.sync_data()
    }
}

/// Durable outbox persisted as an append-only journal file.
#[derive(Debug)]
pub struct FileAuditOutbox {
    path: PathBuf,
    journal: Mutex<Journal>,
}

impl FileAuditOutbox {
    /// Open (or create) the journal at `path`, replaying and compacting it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OutboxError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let state = replay(&path)?;
        compact(&path, &state)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let committed_len = file.metadata()?.len();
        let stats = state.stats();
        info!(
            path = %path.display(),
            pending = stats.pending,
            dead_lettered = stats.dead_lettered,
            "audit outbox opened"
        );

        Ok(Self {
            path,
            journal: Mutex::new(Journal {
                file,
                committed_len,
                state,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_journal<T>(&self, f: impl FnOnce(&mut Journal) -> Result<T, OutboxError>) -> Result<T, OutboxError> {
        let mut journal = self.journal.lock().map_err(|_| OutboxError::Poisoned)?;
        f(&mut journal)
    }
}

fn replay(path: &Path) -> Result<OutboxState, OutboxError> {
    let mut state = OutboxState::default();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(state),
        Err(e) => return Err(e.into()),
    };

    let lines: Vec<String> = BufReader::new(file).lines().collect::<Result<_, _>>()?;
    let last = lines.len().saturating_sub(1);

    for (n, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OutboxRecord>(line) {
            Ok(record) => state.apply(&record)?,
            Err(e) if n == last => {
                warn!(path = %path.display(), line = n + 1, error = %e, "dropping torn outbox journal tail");
            }
            Err(e) => return Err(OutboxError::Corrupt(format!("line {}: {e}", n + 1))),
        }
    }
    Ok(state)
}

fn compact(path: &Path, state: &OutboxState) -> Result<(), OutboxError> {
    let tmp = path.with_extension("compact");
    {
        let mut out = File::create(&tmp)?;
        for record in state.snapshot_records() {
            let mut line = serde_json::to_vec(&record).map_err(|e| OutboxError::Corrupt(e.to_string()))?;
            line.push(b'\n');
            out.write_all(&line)?;
        }
        out.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl AuditOutbox for FileAuditOutbox {
    fn enqueue(&self, entry: AuditEntry, reason: String) -> Result<(), OutboxError> {
        self.with_journal(|j| {
            let record = j.state.plan_enqueue(entry, reason, Utc::now())?;
            j.commit(record)
        })
    }

    fn has_pending(&self, request_id: RequestId) -> Result<bool, OutboxError> {
        self.with_journal(|j| Ok(j.state.has_pending(request_id)))
    }

    fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OutboxItem>, OutboxError> {
        self.with_journal(|j| Ok(j.state.claim_ready(now, limit)))
    }

    fn mark_delivered(&self, entry_id: AuditEntryId) -> Result<(), OutboxError> {
        self.with_journal(|j| {
            let record = j.state.plan_delivered(entry_id)?;
            j.commit(record)
        })
    }

    fn mark_failed(
        &self,
        entry_id: AuditEntryId,
        error: String,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, OutboxError> {
        self.with_journal(|j| {
            let (record, outcome) = j.state.plan_failure(entry_id, error, policy, now)?;
            j.commit(record)?;
            Ok(outcome)
        })
    }

    fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, OutboxError> {
        self.with_journal(|j| Ok(j.state.dead_letters(limit)))
    }

    fn requeue_dead_letter(&self, entry_id: AuditEntryId, now: DateTime<Utc>) -> Result<(), OutboxError> {
        self.with_journal(|j| {
            let record = j.state.plan_requeue(entry_id, now)?;
            j.commit(record)
        })
    }

    fn stats(&self) -> Result<OutboxStats, OutboxError> {
        self.with_journal(|j| Ok(j.state.stats()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audit::test_support::entry_for;

    #[test]
    fn pending_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let request = RequestId::new();
        let a = entry_for(request);
        let b = entry_for(request);

        {
            let outbox = FileAuditOutbox::open(&path).unwrap();
            outbox.enqueue(a.clone(), "down".into()).unwrap();
            outbox.enqueue(b.clone(), "down".into()).unwrap();
            outbox.mark_delivered(a.entry_id).unwrap();
        }

        let reopened = FileAuditOutbox::open(&path).unwrap();
        assert!(reopened.has_pending(request).unwrap());
        let claimed = reopened.claim_ready(Utc::now(), 10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].entry, b);
    }

    #[test]
    fn dead_letters_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let a = entry_for(RequestId::new());
        let policy = RetryPolicy::fixed(1, Duration::from_secs(1));

        {
            let outbox = FileAuditOutbox::open(&path).unwrap();
            outbox.enqueue(a.clone(), "down".into()).unwrap();
            let outcome = outbox.mark_failed(a.entry_id, "still down".into(), &policy, Utc::now()).unwrap();
            assert_eq!(outcome, FailureOutcome::DeadLettered { attempts: 1 });
        }

        let reopened = FileAuditOutbox::open(&path).unwrap();
        let dead = reopened.dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].item.entry.entry_id, a.entry_id);
        assert_eq!(dead[0].item.last_error, "still down");
    }

    #[test]
    fn torn_tail_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let a = entry_for(RequestId::new());
        {
            let outbox = FileAuditOutbox::open(&path).unwrap();
            outbox.enqueue(a.clone(), "down".into()).unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(br#"{"op":"delivered","entry_"#).unwrap();
        drop(f);

        let reopened = FileAuditOutbox::open(&path).unwrap();
        assert_eq!(reopened.stats().unwrap().pending, 1);
    }

    #[test]
    fn stray_tail_bytes_do_not_swallow_next_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let a = entry_for(RequestId::new());
        let b = entry_for(RequestId::new());

        {
            let outbox = FileAuditOutbox::open(&path).unwrap();
            outbox.enqueue(a.clone(), "down".into()).unwrap();

            // Leftover of an append that failed halfway.
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(br#"{"op":"enqueued","item":{"#).unwrap();
            drop(f);

            outbox.enqueue(b.clone(), "down".into()).unwrap();
        }

        let reopened = FileAuditOutbox::open(&path).unwrap();
        assert_eq!(reopened.stats().unwrap().pending, 2);
        let ids: Vec<_> = reopened
            .claim_ready(Utc::now(), 10)
            .unwrap()
            .into_iter()
            .map(|i| i.entry.entry_id)
            .collect();
        assert_eq!(ids, vec![a.entry_id, b.entry_id]);
    }

    #[test]
    fn corruption_before_tail_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let a = entry_for(RequestId::new());
        let line = serde_json::to_string(&OutboxRecord::Enqueued {
            item: OutboxItem {
                entry: a,
                attempts: 0,
                enqueued_at: Utc::now(),
                next_attempt_at: Utc::now(),
                last_error: String::new(),
            },
        })
        .unwrap();
        fs::write(&path, format!("garbage\n{line}\n")).unwrap();

        assert!(matches!(FileAuditOutbox::open(&path), Err(OutboxError::Corrupt(_))));
    }

    #[test]
    fn compaction_drops_delivered_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        {
            let outbox = FileAuditOutbox::open(&path).unwrap();
            for _ in 0..5 {
                let e = entry_for(RequestId::new());
                outbox.enqueue(e.clone(), "down".into()).unwrap();
                outbox.mark_delivered(e.entry_id).unwrap();
            }
        }
        let _ = FileAuditOutbox::open(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.trim().is_empty());
    }
}
