//! Relay worker that drains the audit outbox into the audit store.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::alert::{AlertSink, AuditAlert, TracingAlertSink};
use super::outbox::{AuditOutbox, FailureOutcome, OutboxError};
use super::retry::RetryPolicy;
use super::store::AuditStore;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct AuditRelayConfig {
    /// How often to poll the outbox
    pub poll_interval: Duration,
    /// Max entries claimed per round
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// Thread name, also used in logs
    pub name: String,
}

impl Default for AuditRelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 64,
            retry: RetryPolicy::default(),
            name: "audit-relay".to_string(),
        }
    }
}

impl AuditRelayConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

impl DrainReport {
    pub fn is_idle(&self) -> bool {
        self.delivered == 0 && self.retried == 0 && self.dead_lettered == 0
    }
}

/// Relay runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelayStats {
    pub rounds: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub outbox_errors: u64,
    pub uptime_secs: u64,
}

impl RelayStats {
    fn absorb(&mut self, report: DrainReport) {
        self.rounds += 1;
        self.delivered += report.delivered;
        self.retried += report.retried;
        self.dead_lettered += report.dead_lettered;
    }
}

/// Handle to a running relay thread.
#[derive(Debug)]
pub struct AuditRelayHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<RelayStats>>,
}

impl AuditRelayHandle {
    /// Stop the relay after a final drain pass and wait for the thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Moves deferred entries from the outbox to the store, with retry and dead-lettering.
pub struct AuditRelay {
    store: Arc<dyn AuditStore>,
    outbox: Arc<dyn AuditOutbox>,
    alerts: Arc<dyn AlertSink>,
    config: AuditRelayConfig,
}

impl AuditRelay {
    pub fn new(store: Arc<dyn AuditStore>, outbox: Arc<dyn AuditOutbox>, config: AuditRelayConfig) -> Self {
        Self {
            store,
            outbox,
            alerts: Arc::new(TracingAlertSink),
            config,
        }
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Deliver everything that is due at `now`.
    ///
    /// Keeps claiming while deliveries make progress, so a request's queued
    /// entries all go out in one pass once the store is back.
    pub fn drain_once(&self, now: DateTime<Utc>) -> Result<DrainReport, OutboxError> {
        let mut report = DrainReport::default();

        loop {
            let items = self.outbox.claim_ready(now, self.config.batch_size)?;
            if items.is_empty() {
                break;
            }

            let mut progressed = false;
            for item in items {
                let entry_id = item.entry.entry_id;
                match self.store.append(&item.entry) {
                    Ok(outcome) => {
                        self.outbox.mark_delivered(entry_id)?;
                        debug!(entry_id = %entry_id, outcome = ?outcome, attempts = item.attempts, "deferred audit entry delivered");
                        report.delivered += 1;
                        progressed = true;
                    }
                    Err(e) => {
                        let error = e.to_string();
                        match self.outbox.mark_failed(entry_id, error.clone(), &self.config.retry, now)? {
                            FailureOutcome::RetryScheduled {
                                attempts,
                                next_attempt_at,
                            } => {
                                warn!(
                                    entry_id = %entry_id,
                                    attempts,
                                    next_attempt_at = %next_attempt_at,
                                    error = %error,
                                    "audit delivery failed, retry scheduled"
                                );
                                report.retried += 1;
                            }
                            FailureOutcome::DeadLettered { attempts } => {
                                self.alerts.alert(AuditAlert::DeadLettered {
                                    entry_id,
                                    request_id: item.entry.request_id,
                                    attempts,
                                    last_error: error,
                                });
                                report.dead_lettered += 1;
                            }
                        }
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        Ok(report)
    }

    /// Run the relay on a background thread.
    pub fn spawn(self) -> std::io::Result<AuditRelayHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(RelayStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || relay_loop(self, shutdown_rx, stats_clone))?;

        Ok(AuditRelayHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn relay_loop(relay: AuditRelay, shutdown_rx: mpsc::Receiver<()>, stats: Arc<Mutex<RelayStats>>) {
    let name = relay.config.name.clone();
    info!(relay = %name, "audit relay started");
    let start_time = Instant::now();

    loop {
        let stop = match shutdown_rx.recv_timeout(relay.config.poll_interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => true,
            Err(mpsc::RecvTimeoutError::Timeout) => false,
        };

        let result = relay.drain_once(Utc::now());
        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
            match result {
                Ok(report) => s.absorb(report),
                Err(ref e) => {
                    s.outbox_errors += 1;
                    error!(relay = %name, error = %e, "audit outbox drain failed");
                }
            }
        }

        if stop {
            break;
        }
    }

    info!(relay = %name, "audit relay stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    use unitgate_core::RequestId;

    use crate::audit::alert::MemoryAlertSink;
    use crate::audit::outbox::InMemoryAuditOutbox;
    use crate::audit::recorder::{AuditRecorder, RecordOutcome};
    use crate::audit::test_support::{FlakyStore, entry_for};

    fn setup(retry: RetryPolicy) -> (Arc<FlakyStore>, Arc<InMemoryAuditOutbox>, Arc<MemoryAlertSink>, AuditRelay) {
        let store = Arc::new(FlakyStore::failing());
        let outbox = Arc::new(InMemoryAuditOutbox::new());
        let alerts = Arc::new(MemoryAlertSink::new());
        let relay = AuditRelay::new(
            store.clone(),
            outbox.clone(),
            AuditRelayConfig::default().with_retry(retry),
        )
        .with_alerts(alerts.clone());
        (store, outbox, alerts, relay)
    }

    #[test]
    fn drain_delivers_in_request_order_after_recovery() {
        let (store, outbox, alerts, relay) = setup(RetryPolicy::fixed(5, Duration::ZERO));
        let recorder = AuditRecorder::new(store.clone(), outbox.clone()).with_alerts(alerts.clone());
        let request = RequestId::new();

        let ids: Vec<_> = (0..3)
            .map(|_| recorder.persist(entry_for(request)))
            .map(|o| {
                assert!(matches!(o, RecordOutcome::Deferred(_)));
                o.entry_id()
            })
            .collect();

        store.set_failing(false);
        let report = relay.drain_once(Utc::now()).unwrap();

        assert_eq!(report.delivered, 3);
        let stored: Vec<_> = store.by_request(request).unwrap().into_iter().map(|e| e.entry_id).collect();
        assert_eq!(stored, ids);
        assert_eq!(outbox.stats().unwrap().pending, 0);
    }

    #[test]
    fn failures_are_retried_then_dead_lettered() {
        let (_store, outbox, alerts, relay) = setup(RetryPolicy::fixed(2, Duration::ZERO));
        let entry = entry_for(RequestId::new());
        outbox.enqueue(entry.clone(), "down".into()).unwrap();

        let report = relay.drain_once(Utc::now()).unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.delivered, 0);

        let report = relay.drain_once(Utc::now()).unwrap();
        assert_eq!(report.dead_lettered, 1);

        assert_eq!(outbox.dead_letters(10).unwrap().len(), 1);
        assert!(
            alerts
                .alerts()
                .iter()
                .any(|a| matches!(a, AuditAlert::DeadLettered { attempts: 2, .. }))
        );
    }

    #[test]
    fn backoff_defers_next_attempt() {
        let (store, outbox, _alerts, relay) = setup(RetryPolicy::fixed(5, Duration::from_secs(60)));
        outbox.enqueue(entry_for(RequestId::new()), "down".into()).unwrap();

        let now = Utc::now();
        assert_eq!(relay.drain_once(now).unwrap().retried, 1);

        store.set_failing(false);
        assert!(relay.drain_once(now).unwrap().is_idle());
        assert_eq!(relay.drain_once(now + chrono::Duration::seconds(61)).unwrap().delivered, 1);
    }

    #[test]
    fn duplicate_in_store_counts_as_delivered() {
        let (store, outbox, _alerts, relay) = setup(RetryPolicy::default());
        store.set_failing(false);
        let entry = entry_for(RequestId::new());
        store.append(&entry).unwrap();
        outbox.enqueue(entry, "timeout after write".into()).unwrap();

        assert_eq!(relay.drain_once(Utc::now()).unwrap().delivered, 1);
        assert_eq!(store.inner.len(), 1);
    }

    #[test]
    fn spawned_relay_drains_and_stops() {
        let (store, outbox, _alerts, relay) = setup(RetryPolicy::fixed(100, Duration::ZERO));
        store.set_failing(false);
        outbox.enqueue(entry_for(RequestId::new()), "down".into()).unwrap();

        let relay = AuditRelay {
            config: relay.config.clone().with_poll_interval(Duration::from_millis(10)),
            ..relay
        };
        let handle = relay.spawn().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.stats().delivered == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handle.stats().delivered, 1);
        handle.shutdown();
        assert_eq!(store.inner.len(), 1);
    }
}
