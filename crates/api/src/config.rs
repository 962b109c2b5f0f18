//! API process configuration.

use std::net::SocketAddr;

use tracing::warn;

use unitgate_infra::{AuditConfig, ConfigError};

use crate::gating::GatingMode;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub gating_mode: GatingMode,
    pub audit: AuditConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::invalid("BIND_ADDR", raw.clone(), e.to_string()))?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let gating_mode = match get("UI_GATING_MODE") {
            Some(raw) => raw
                .parse()
                .map_err(|e: crate::gating::UnknownGatingMode| ConfigError::invalid("UI_GATING_MODE", raw.clone(), e.to_string()))?,
            None => GatingMode::default(),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            gating_mode,
            audit: AuditConfig::from_lookup(&lookup)?,
        })
    }
}
