//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: audit pipeline and record store wiring
//! - `records.rs`: the unit-owned record store
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses, including denials

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::jwt::JwtValidator;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod records;
pub mod routes;
pub mod services;

/// Build the full HTTP router.
///
/// Layer order (outermost first): request id, auth, then per-route guards.
pub fn build_app(services: Arc<AppServices>, jwt: Arc<dyn JwtValidator>) -> Router {
    let auth_state = middleware::AuthState { jwt };

    let protected = routes::router(&services)
        .route_layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware))
        .layer(Extension(services));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/authz/taxonomy", get(routes::authz::taxonomy))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::request_id_middleware)))
}

pub use services::AppServices;
