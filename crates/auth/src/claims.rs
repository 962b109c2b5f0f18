use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use unitgate_core::{PrincipalId, UnitId};

use crate::principal::Principal;
use crate::roles::{Role, UnknownRole};

/// Identity claims model (transport-agnostic).
///
/// The minimal set of claims expected once a token has been decoded and its
/// signature verified by whatever transport/security layer is in use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject / principal identifier.
    pub sub: PrincipalId,

    /// Role name as issued (e.g. `"DIRETOR_UNIDADE"`).
    pub role: String,

    /// Unit the principal is bound to, if any.
    #[serde(default)]
    pub unit_id: Option<UnitId>,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),
}

/// Deterministically validate the claims' time window.
///
/// Signature verification / decoding is outside this crate.
pub fn validate_claims(claims: &IdentityClaims, now: DateTime<Utc>) -> Result<(), ClaimsError> {
    if claims.expires_at <= claims.issued_at {
        return Err(ClaimsError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(ClaimsError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(ClaimsError::Expired);
    }
    Ok(())
}

impl Principal {
    /// Bind validated claims to a principal.
    ///
    /// Fails only when the role name is outside the closed enumeration.
    pub fn try_from_claims(claims: &IdentityClaims) -> Result<Self, ClaimsError> {
        let role: Role = claims.role.parse()?;
        Ok(Principal::new(claims.sub, role, claims.unit_id))
    }
}
