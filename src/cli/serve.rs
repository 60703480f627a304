use crate::service::{self, RATES_PATH, RateService};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Serves the rate endpoint until Ctrl-C.
pub async fn run(service: Arc<RateService>, listen: &str) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!(%local_addr, path = RATES_PATH, "Rate service listening");

    axum::serve(listener, service::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Rate service stopped unexpectedly")?;

    info!("Rate service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
