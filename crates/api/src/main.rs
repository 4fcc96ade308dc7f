use std::sync::Arc;

use anyhow::Context;

use storekeep_api::app::{AppServices, build_app};
use storekeep_infra::{AppConfig, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storekeep_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let store = store::open(&config.store).await.context("failed to open store")?;
    let services = Arc::new(AppServices::new(store.clone(), config.signal_channel_capacity));

    let app = build_app(services, config.jwt_secret.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    store.close().await;
    tracing::info!("store closed; bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
