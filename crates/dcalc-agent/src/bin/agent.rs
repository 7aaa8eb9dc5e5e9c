//! # dcalc Agent
//!
//! Deployment target for one compute agent.

use tracing::info;

use dcalc_shared::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "starting dcalc agent");
    dcalc_agent::bootstrap::run().await?;
    Ok(())
}
