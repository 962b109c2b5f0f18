//! Domain error model.

use thiserror::Error;

/// Domain-level error.
///
/// Authorization denials are *not* errors: they are `Decision` values produced
/// by `unitgate-auth`. This type covers malformed input at the edges.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
