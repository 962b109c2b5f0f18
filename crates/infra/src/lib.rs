//! Infrastructure for the authorization engine: audit persistence, the durable
//! outbox and its relay, and environment configuration.

pub mod audit;
pub mod config;

pub use config::{AuditConfig, ConfigError};
