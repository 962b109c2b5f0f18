use std::sync::Arc;

use anyhow::Context;

use unitgate_api::{
    app::{self, services},
    config::ApiConfig,
    jwt::Hs256JwtValidator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    unitgate_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;

    let (services, relay) = services::build_services(&config.audit, config.gating_mode)
        .await
        .context("failed to build services")?;
    let relay = relay.spawn().context("failed to start audit relay")?;

    let jwt = Arc::new(Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let app = app::build_app(Arc::new(services), jwt);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, gating = ?config.gating_mode, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Final drain happens inside shutdown; it may block on the store.
    tokio::task::spawn_blocking(move || relay.shutdown()).await?;
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
