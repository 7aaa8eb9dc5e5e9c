//! # dcalc Orchestrator Server
//!
//! Deployment target for the orchestration service: distributor loops plus
//! the HTTP API, shut down together on ctrl-c.

use tracing::info;

use dcalc_orchestration::Orchestrator;
use dcalc_shared::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "starting dcalc orchestrator");

    let orchestrator = Orchestrator::bootstrap().await?;
    let loops = orchestrator.spawn_distributor();

    let bind_addr = orchestrator.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "orchestrator API listening");

    axum::serve(listener, orchestrator.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, stopping distributor loops");
    for handle in loops {
        handle.abort();
    }
    info!("orchestrator stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
    }
}
