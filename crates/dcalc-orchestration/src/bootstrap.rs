//! # Bootstrap
//!
//! Builds the orchestrator from the environment: task store pool (with
//! migrations), broker client, signing keys, distributor, router. The
//! binary wires the pieces together and owns the shutdown sequence.

use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;
use tracing::info;

use dcalc_shared::auth::JwtKeys;
use dcalc_shared::config::{BrokerConfig, DatabaseConfig, OrchestratorConfig};
use dcalc_shared::errors::DcalcResult;
use dcalc_shared::messaging::BrokerClient;
use dcalc_shared::{database, SystemContext};

use crate::distributor::Distributor;
use crate::web::{self, AppState};

#[derive(Debug)]
pub struct Orchestrator {
    pub config: OrchestratorConfig,
    context: Arc<SystemContext>,
    jwt: Arc<JwtKeys>,
}

impl Orchestrator {
    /// Connect to the store and the broker, run migrations, and assemble
    /// the service.
    pub async fn bootstrap() -> DcalcResult<Self> {
        let database_config = DatabaseConfig::from_env()?;
        let broker_config = BrokerConfig::from_env()?;
        let config = OrchestratorConfig::from_env()?;

        let pool = database::connect(&database_config).await?;
        database::migrate(&pool).await?;
        let broker = BrokerClient::connect(&broker_config).await?;

        let jwt = Arc::new(JwtKeys::new(&config.jwt_secret));
        let context = Arc::new(SystemContext::new(pool, broker));
        info!("orchestrator bootstrapped");
        Ok(Self {
            config,
            context,
            jwt,
        })
    }

    /// Start the five distributor loops.
    pub fn spawn_distributor(&self) -> Vec<JoinHandle<()>> {
        Distributor::new(self.context.clone(), self.config.clone()).spawn()
    }

    /// The HTTP route tree backed by this orchestrator's state.
    pub fn router(&self) -> Router {
        web::router(AppState {
            context: self.context.clone(),
            jwt: self.jwt.clone(),
        })
    }
}
