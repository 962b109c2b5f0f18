//! Environment configuration for the audit pipeline.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::audit::{AuditRelayConfig, BackoffStrategy, RetryPolicy};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Audit pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditConfig {
    /// File journal for the outbox; in-memory outbox when `None`.
    pub outbox_path: Option<PathBuf>,
    /// Postgres audit store; in-memory store when `None`.
    pub database_url: Option<String>,
    pub retry: RetryPolicy,
    pub relay_poll_interval: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            outbox_path: None,
            database_url: None,
            retry: RetryPolicy::default(),
            relay_poll_interval: Duration::from_millis(500),
        }
    }
}

impl AuditConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_attempts = parse_or(&lookup, "AUDIT_MAX_ATTEMPTS", defaults.retry.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::invalid("AUDIT_MAX_ATTEMPTS", "0", "must be at least 1"));
        }
        let base_ms = parse_or(&lookup, "AUDIT_BASE_DELAY_MS", defaults.retry.base_delay.as_millis() as u64)?;
        let max_ms = parse_or(&lookup, "AUDIT_MAX_DELAY_MS", defaults.retry.max_delay.as_millis() as u64)?;
        if max_ms < base_ms {
            return Err(ConfigError::invalid(
                "AUDIT_MAX_DELAY_MS",
                max_ms.to_string(),
                "must not be below AUDIT_BASE_DELAY_MS",
            ));
        }
        let poll_ms = parse_or(&lookup, "AUDIT_RELAY_POLL_MS", defaults.relay_poll_interval.as_millis() as u64)?;

        Ok(Self {
            outbox_path: non_empty(&lookup, "AUDIT_OUTBOX_PATH").map(PathBuf::from),
            database_url: non_empty(&lookup, "DATABASE_URL"),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms),
                strategy: BackoffStrategy::Exponential,
                ..defaults.retry
            },
            relay_poll_interval: Duration::from_millis(poll_ms),
        })
    }

    pub fn relay_config(&self) -> AuditRelayConfig {
        AuditRelayConfig::default()
            .with_retry(self.retry.clone())
            .with_poll_interval(self.relay_poll_interval)
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::invalid(var, raw.clone(), e.to_string())),
    }
}
