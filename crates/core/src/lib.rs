//! `unitgate-core` — shared identifiers and the domain error model.
//!
//! Everything here is pure data: no I/O, no policy.

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::{PrincipalId, RecordId, RequestId, UnitId};
