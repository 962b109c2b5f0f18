use std::sync::Arc;

use axum::{Router, routing::get};

use unitgate_auth::{Action, ResourceKind, ResourceReference};

use crate::app::services::AppServices;
use crate::authz::{RouteGuard, route_guard};

pub mod audit;
pub mod authz;
pub mod records;
pub mod system;

/// Router for every endpoint behind the auth middleware.
pub fn router(services: &Arc<AppServices>) -> Router {
    let audit_guard = RouteGuard::new(
        ResourceReference::unowned(ResourceKind::Report),
        Action::Read,
        services.recorder.clone(),
    );

    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/authz", authz::router())
        .nest("/records", records::router())
        .nest(
            "/audit",
            audit::router().layer(axum::middleware::from_fn_with_state(audit_guard, route_guard)),
        )
}
