//! `unitgate-auth` — pure authorization boundary for the school network.
//!
//! Three tiers, one rule: the strategic tier audits, the unit tier executes.
//! This crate is intentionally decoupled from HTTP and storage; it consumes an
//! already-authenticated [`Principal`] and returns a [`Decision`].

pub mod authorize;
pub mod claims;
pub mod decision;
pub mod principal;
pub mod resources;
pub mod roles;

pub use authorize::{
    AuthzError, DecisionExplanation, PrincipalState, RuleCheck, decide, explain,
    revalidate_ownership,
};
pub use claims::{ClaimsError, IdentityClaims, validate_claims};
pub use decision::{Action, Decision, ReasonCode, RuleId};
pub use principal::Principal;
pub use resources::{
    ResourceCategory, ResourceKind, ResourceReference, UnknownResourceKind, is_administrative,
    is_operational,
};
pub use roles::{Role, Tier, UnknownRole, tier_of};
