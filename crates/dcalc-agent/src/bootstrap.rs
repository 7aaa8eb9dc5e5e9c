//! # Bootstrap
//!
//! Wires the agent from the environment: broker client, a store handle for
//! owner lookups, the worker pool, the result publisher and the heartbeat.
//! Runs until ctrl-c.

use tracing::info;

use dcalc_shared::config::{AgentConfig, BrokerConfig, DatabaseConfig};
use dcalc_shared::database;
use dcalc_shared::errors::DcalcResult;
use dcalc_shared::messaging::BrokerClient;

use crate::consumer::{self, OperationConsumer};
use crate::heartbeat;
use crate::pool::WorkerPool;

pub async fn run() -> DcalcResult<()> {
    let config = AgentConfig::from_env()?;
    let database_config = DatabaseConfig::from_env()?;
    let broker_config = BrokerConfig::from_env()?;

    let pool = database::connect(&database_config).await?;
    let broker = BrokerClient::connect(&broker_config).await?;

    let (workers, results) = WorkerPool::start(config.max_concurrent);
    info!(
        worker_name = %config.worker_name,
        max_concurrent = config.max_concurrent,
        "agent started"
    );

    tokio::spawn(consumer::publish_results(broker.clone(), results));
    tokio::spawn(heartbeat::run(
        config.orchestrator_url.clone(),
        config.worker_name.clone(),
        config.heartbeat_interval,
        workers.in_flight_counter(),
    ));
    tokio::spawn(OperationConsumer::new(broker, pool, workers).run());

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received, agent stopping");
    Ok(())
}
