//! # Configuration
//!
//! Environment-driven configuration for both binaries. Each deployable
//! service reads one config struct at startup; the structs own their
//! defaults and validate required variables up front so a misconfigured
//! process fails before touching the store or the broker.
//!
//! Variables:
//!
//! ```text
//! POSTGRES_ADDRESS / POSTGRES_PORT / POSTGRES_USER / POSTGRES_PASSWORD / POSTGRES_DB
//! REDIS_ADDRESS / REDIS_PORT / REDIS_PASSWORD
//! ORCHESTRATOR_ADDRESS / ORCHESTRATOR_PORT
//! JWT_SECRET_KEY
//! MAX_GOROUTINE_PER_AGENT / WORKER_NAME
//! ```

use std::env;
use std::time::Duration;

use crate::errors::{DcalcError, DcalcResult};

/// Default simulated cost of an operator when a user has no stored timeouts.
pub const DEFAULT_OPERATOR_DELAY: Duration = Duration::from_secs(10);

fn required(name: &str) -> DcalcResult<String> {
    env::var(name)
        .map_err(|_| DcalcError::Configuration(format!("missing environment variable {name}")))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Task store connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DatabaseConfig {
    pub fn from_env() -> DcalcResult<Self> {
        Ok(Self {
            host: required("POSTGRES_ADDRESS")?,
            port: required("POSTGRES_PORT")?
                .parse()
                .map_err(|_| DcalcError::Configuration("POSTGRES_PORT is not a port".into()))?,
            user: required("POSTGRES_USER")?,
            password: required("POSTGRES_PASSWORD")?,
            database: required("POSTGRES_DB")?,
        })
    }

    /// Connection URL in the form sqlx expects.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl BrokerConfig {
    pub fn from_env() -> DcalcResult<Self> {
        Ok(Self {
            host: required("REDIS_ADDRESS")?,
            port: required("REDIS_PORT")?
                .parse()
                .map_err(|_| DcalcError::Configuration("REDIS_PORT is not a port".into()))?,
            password: optional("REDIS_PASSWORD", ""),
        })
    }

    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/", self.host, self.port)
        } else {
            format!("redis://:{}@{}:{}/", self.password, self.host, self.port)
        }
    }
}

/// Orchestrator service settings: bind address, signing secret and the
/// periods of the distributor loops.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub address: String,
    pub port: u16,
    pub jwt_secret: String,
    pub decomposition_interval: Duration,
    pub dispatch_interval: Duration,
    pub promotion_interval: Duration,
    pub recovery_interval: Duration,
}

impl OrchestratorConfig {
    pub fn from_env() -> DcalcResult<Self> {
        Ok(Self {
            address: optional("ORCHESTRATOR_ADDRESS", "0.0.0.0"),
            port: optional("ORCHESTRATOR_PORT", "8080")
                .parse()
                .map_err(|_| DcalcError::Configuration("ORCHESTRATOR_PORT is not a port".into()))?,
            jwt_secret: required("JWT_SECRET_KEY")?,
            decomposition_interval: Duration::from_secs(2),
            dispatch_interval: Duration::from_secs(2),
            promotion_interval: Duration::from_secs(2),
            recovery_interval: Duration::from_secs(60),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Base URL agents use to reach the orchestrator API.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Agent service settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub worker_name: String,
    pub max_concurrent: usize,
    pub orchestrator_url: String,
    pub heartbeat_interval: Duration,
}

impl AgentConfig {
    pub fn from_env() -> DcalcResult<Self> {
        let max_concurrent = match env::var("MAX_GOROUTINE_PER_AGENT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "MAX_GOROUTINE_PER_AGENT is not a number, using default");
                10
            }),
            Err(_) => 10,
        };
        let address = optional("ORCHESTRATOR_ADDRESS", "127.0.0.1");
        let port = optional("ORCHESTRATOR_PORT", "8080");
        Ok(Self {
            worker_name: required("WORKER_NAME")?,
            max_concurrent,
            orchestrator_url: format!("http://{address}:{port}"),
            heartbeat_interval: Duration::from_secs(1),
        })
    }
}
