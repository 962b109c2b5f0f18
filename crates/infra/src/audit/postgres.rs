//! Postgres-backed audit store.
//!
//! The table is append-only at the database level: a trigger rejects every
//! UPDATE and DELETE, so application code cannot rewrite history even by
//! mistake. Retention jobs run as a separate role with the trigger disabled.
//!
//! ## Error Mapping
//!
//! | SQLx Error | AuditStoreError |
//! |------------|-----------------|
//! | Database (any code) | `Unavailable` |
//! | PoolClosed / Io / timeouts | `Unavailable` |
//! | JSON payload (de)serialization | `Encoding` |
//!
//! Every failure is `Unavailable` from the recorder's point of view: the entry
//! goes to the outbox and the relay retries it.

use std::future::Future;

use sqlx::{PgPool, Row};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::instrument;

use unitgate_core::RequestId;

use super::entry::AuditEntry;
use super::store::{AppendOutcome, AuditStore, AuditStoreError};

/// Schema for the audit table.
pub const AUDIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_entries (
    seq            BIGSERIAL   NOT NULL UNIQUE,
    entry_id       UUID        PRIMARY KEY,
    request_id     UUID        NOT NULL,
    principal_id   UUID        NOT NULL,
    owner_unit_id  UUID        NULL,
    resource_kind  TEXT        NOT NULL,
    action         TEXT        NOT NULL,
    allowed        BOOLEAN     NOT NULL,
    reason_code    TEXT        NOT NULL,
    rule_id        TEXT        NOT NULL,
    recorded_at    TIMESTAMPTZ NOT NULL,
    payload        JSONB       NOT NULL
);

CREATE INDEX IF NOT EXISTS audit_entries_request_idx ON audit_entries (request_id, seq);
CREATE INDEX IF NOT EXISTS audit_entries_owner_unit_idx ON audit_entries (owner_unit_id, recorded_at);

CREATE OR REPLACE FUNCTION audit_entries_reject_mutation() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'audit_entries is append-only';
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS audit_entries_append_only ON audit_entries;
CREATE TRIGGER audit_entries_append_only
    BEFORE UPDATE OR DELETE ON audit_entries
    FOR EACH ROW EXECUTE FUNCTION audit_entries_reject_mutation();
"#;

/// Postgres audit store.
///
/// Exposes async methods for callers already on the runtime, and implements
/// the synchronous [`AuditStore`] by blocking on the captured runtime handle.
/// The blocking path requires a multi-threaded runtime when called from
/// inside it (the relay thread sits outside the runtime and is always fine).
#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
    runtime: Handle,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self { pool, runtime }
    }

    pub async fn migrate(&self) -> Result<(), AuditStoreError> {
        sqlx::raw_sql(AUDIT_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id, request_id = %entry.request_id), err)]
    pub async fn insert(&self, entry: &AuditEntry) -> Result<AppendOutcome, AuditStoreError> {
        let payload = serde_json::to_value(entry).map_err(|e| AuditStoreError::Encoding(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO audit_entries (
                entry_id, request_id, principal_id, owner_unit_id, resource_kind,
                action, allowed, reason_code, rule_id, recorded_at, payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (entry_id) DO NOTHING
            "#,
        )
        .bind(entry.entry_id.as_uuid())
        .bind(entry.request_id.as_uuid())
        .bind(entry.principal_id.as_uuid())
        .bind(entry.owner_unit_id.map(|u| *u.as_uuid()))
        .bind(entry.resource_kind.as_str())
        .bind(entry.action.as_str())
        .bind(entry.allowed)
        .bind(entry.reason_code.as_str())
        .bind(entry.rule_id.as_str())
        .bind(entry.timestamp)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("append", e))?;

        Ok(if result.rows_affected() == 0 {
            AppendOutcome::Duplicate
        } else {
            AppendOutcome::Appended
        })
    }

    pub async fn fetch_by_request(&self, request_id: RequestId) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let rows = sqlx::query("SELECT payload FROM audit_entries WHERE request_id = $1 ORDER BY seq ASC")
            .bind(request_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("by_request", e))?;
        decode_rows(rows)
    }

    pub async fn fetch_recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query("SELECT payload FROM audit_entries ORDER BY seq DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("recent", e))?;
        decode_rows(rows)
    }

    fn block_on<F: Future>(&self, fut: F) -> Result<F::Output, AuditStoreError> {
        match Handle::try_current() {
            Err(_) => Ok(self.runtime.block_on(fut)),
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| self.runtime.block_on(fut)))
            }
            Ok(_) => Err(AuditStoreError::Unavailable(
                "blocking audit write requires a multi-threaded runtime".to_string(),
            )),
        }
    }
}

fn decode_rows(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<AuditEntry>, AuditStoreError> {
    rows.into_iter()
        .map(|row| {
            let payload: serde_json::Value = row
                .try_get("payload")
                .map_err(|e| AuditStoreError::Encoding(e.to_string()))?;
            serde_json::from_value(payload).map_err(|e| AuditStoreError::Encoding(e.to_string()))
        })
        .collect()
}

impl AuditStore for PostgresAuditStore {
    fn append(&self, entry: &AuditEntry) -> Result<AppendOutcome, AuditStoreError> {
        self.block_on(self.insert(entry))?
    }

    fn by_request(&self, request_id: RequestId) -> Result<Vec<AuditEntry>, AuditStoreError> {
        self.block_on(self.fetch_by_request(request_id))?
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditStoreError> {
        self.block_on(self.fetch_recent(limit))?
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> AuditStoreError {
    match err {
        sqlx::Error::Database(db_err) => AuditStoreError::Unavailable(format!(
            "database error in {} ({}): {}",
            operation,
            db_err.code().as_deref().unwrap_or("-"),
            db_err.message()
        )),
        sqlx::Error::PoolClosed => AuditStoreError::Unavailable(format!("connection pool closed in {operation}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            AuditStoreError::Encoding(format!("decode error in {operation}: {err}"))
        }
        _ => AuditStoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_rejects_update_and_delete() {
        assert!(AUDIT_SCHEMA.contains("BEFORE UPDATE OR DELETE ON audit_entries"));
        assert!(AUDIT_SCHEMA.contains("entry_id       UUID        PRIMARY KEY"));
    }

    /// Runs only when `DATABASE_URL` points at a disposable Postgres.
    #[test]
    fn round_trip_against_live_database() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let rt = tokio::runtime::Runtime::new().unwrap();
        let pool = rt.block_on(PgPool::connect(&url)).unwrap();
        let store = PostgresAuditStore::new(pool, rt.handle().clone());
        rt.block_on(store.migrate()).unwrap();

        let request = RequestId::new();
        let entry = crate::audit::test_support::entry_for(request);
        assert_eq!(store.append(&entry).unwrap(), AppendOutcome::Appended);
        assert_eq!(store.append(&entry).unwrap(), AppendOutcome::Duplicate);
        assert_eq!(store.by_request(request).unwrap(), vec![entry]);
    }
}
