//! HTTP enforcement adapter: bearer auth, request correlation, decision
//! guards that map denials to 401/403, and UI control gating.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod gating;
pub mod jwt;
pub mod middleware;
