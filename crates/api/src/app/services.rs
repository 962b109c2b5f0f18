//! Service wiring: audit pipeline, record store, gating mode.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use unitgate_infra::AuditConfig;
use unitgate_infra::audit::{
    AuditOutbox, AuditRecorder, AuditRelay, AuditStore, AuditStoreError, FileAuditOutbox, InMemoryAuditOutbox,
    InMemoryAuditStore, OutboxError, PostgresAuditStore,
};

use super::records::RecordStore;
use crate::gating::GatingMode;

/// Everything the handlers share.
#[derive(Debug)]
pub struct AppServices {
    pub recorder: AuditRecorder,
    pub records: RecordStore,
    pub gating: GatingMode,
}

impl AppServices {
    pub fn new(recorder: AuditRecorder, gating: GatingMode) -> Self {
        Self {
            recorder,
            records: RecordStore::new(),
            gating,
        }
    }

    /// In-memory audit store and outbox (dev/test).
    pub fn in_memory(gating: GatingMode) -> Self {
        Self::new(
            AuditRecorder::new(Arc::new(InMemoryAuditStore::new()), Arc::new(InMemoryAuditOutbox::new())),
            gating,
        )
    }
}

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("failed to connect to audit database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to prepare audit schema: {0}")]
    Migration(#[from] AuditStoreError),

    #[error("failed to open audit outbox: {0}")]
    Outbox(#[from] OutboxError),
}

/// Build services from configuration, plus the relay that drains their outbox.
///
/// Must be called from inside a tokio runtime when a database is configured.
pub async fn build_services(audit: &AuditConfig, gating: GatingMode) -> Result<(AppServices, AuditRelay), ServicesError> {
    let store: Arc<dyn AuditStore> = match &audit.database_url {
        Some(url) => {
            let pool = PgPool::connect(url).await?;
            let store = PostgresAuditStore::new(pool, tokio::runtime::Handle::current());
            store.migrate().await?;
            info!("audit store: postgres");
            Arc::new(store)
        }
        None => {
            info!("audit store: in-memory");
            Arc::new(InMemoryAuditStore::new())
        }
    };

    let outbox: Arc<dyn AuditOutbox> = match &audit.outbox_path {
        Some(path) => {
            info!(path = %path.display(), "audit outbox: file journal");
            Arc::new(FileAuditOutbox::open(path)?)
        }
        None => {
            info!("audit outbox: in-memory");
            Arc::new(InMemoryAuditOutbox::new())
        }
    };

    let recorder = AuditRecorder::new(store.clone(), outbox.clone());
    let relay = AuditRelay::new(store, outbox, audit.relay_config());

    Ok((AppServices::new(recorder, gating), relay))
}
