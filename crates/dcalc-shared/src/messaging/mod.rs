//! # Broker Client
//!
//! Domain-level client for the in-memory broker: a FIFO list carrying
//! dispatched operation payloads, a notification channel telling agents the
//! list has work, a results channel flowing back to the orchestrator, and
//! small hashes for per-user operator timeouts and worker liveness.
//!
//! The client is a struct over a shared [`ConnectionManager`] (command
//! traffic) plus the underlying [`redis::Client`] (pub/sub subscriptions
//! need their own connections). Cloning is cheap; both binaries share one
//! instance per process.

mod messages;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::{ConnectionManager, PubSub};
use redis::AsyncCommands;
use tracing::info;

use crate::config::BrokerConfig;
use crate::errors::DcalcResult;
use crate::models::Operator;

pub use messages::{HeartbeatPayload, OperationPayload, ResultPayload};

/// FIFO list of JSON operation payloads awaiting an agent.
pub const OPERATIONS_LIST: &str = "operations_lists";
/// Notification channel; the payload is the owning userid in string form.
pub const OPERATIONS_CHANNEL: &str = "operations";
/// Result channel; the payload is a JSON [`ResultPayload`].
pub const RESULTS_CHANNEL: &str = "results";
/// Hash of worker name → RFC3339 timestamp of the last heartbeat.
pub const WORKERS_HASH: &str = "workers";
/// Hash of worker name → reported in-flight task count.
pub const WORKER_TASK_COUNT_HASH: &str = "workersTaskCount";

/// A worker whose last heartbeat is older than this reports NO RESPONSE and
/// is not counted as dispatch capacity.
pub const WORKER_LIVENESS_WINDOW: Duration = Duration::from_secs(60);

/// Key of a user's operator-timeout hash.
pub fn timeouts_key(user_id: i32) -> String {
    format!("operationTimeouts_{user_id}")
}

/// Reported liveness of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Ok,
    NoResponse,
}

impl WorkerStatus {
    pub fn from_last_seen(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let age = now.signed_duration_since(last_seen);
        if age.to_std().map_or(true, |age| age <= WORKER_LIVENESS_WINDOW) {
            WorkerStatus::Ok
        } else {
            WorkerStatus::NoResponse
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Ok => "OK",
            WorkerStatus::NoResponse => "NO RESPONSE",
        }
    }
}

/// Shared broker handle.
#[derive(Clone)]
pub struct BrokerClient {
    client: redis::Client,
    manager: ConnectionManager,
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient").finish_non_exhaustive()
    }
}

impl BrokerClient {
    /// Connect and verify the broker answers.
    pub async fn connect(config: &BrokerConfig) -> DcalcResult<Self> {
        let client = redis::Client::open(config.url())?;
        let mut manager = ConnectionManager::new(client.clone()).await?;
        let _: String = redis::cmd("PING").query_async(&mut manager).await?;
        info!(host = %config.host, "connected to broker");
        Ok(Self { client, manager })
    }

    /// Push one operation payload onto the FIFO and publish the owning
    /// userid as a notification. The payload lives in the list; the channel
    /// only signals that work exists.
    pub async fn enqueue_operation(
        &self,
        payload: &OperationPayload,
        user_id: i32,
    ) -> DcalcResult<()> {
        let encoded = serde_json::to_string(payload)?;
        let mut conn = self.manager.clone();
        let _: () = conn.rpush(OPERATIONS_LIST, encoded).await?;
        let _: i64 = conn
            .publish(OPERATIONS_CHANNEL, user_id.to_string())
            .await?;
        Ok(())
    }

    /// Pop the next operation payload; `None` when the list is drained
    /// (a peer agent won the race).
    pub async fn pop_operation(&self) -> DcalcResult<Option<OperationPayload>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.rpop(OPERATIONS_LIST, None).await?;
        match raw {
            Some(encoded) => Ok(Some(serde_json::from_str(&encoded)?)),
            None => Ok(None),
        }
    }

    pub async fn publish_result(&self, payload: &ResultPayload) -> DcalcResult<()> {
        let encoded = serde_json::to_string(payload)?;
        let mut conn = self.manager.clone();
        let _: i64 = conn.publish(RESULTS_CHANNEL, encoded).await?;
        Ok(())
    }

    /// Open a dedicated pub/sub connection subscribed to `channel`.
    pub async fn subscribe(&self, channel: &str) -> DcalcResult<PubSub> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }

    /// Store a user's operator timeouts (nanoseconds per operator). Only the
    /// four arithmetic operators exist in the key space by construction.
    pub async fn set_operator_timeouts(
        &self,
        user_id: i32,
        timeouts: &HashMap<Operator, Duration>,
    ) -> DcalcResult<()> {
        let key = timeouts_key(user_id);
        let mut conn = self.manager.clone();
        for (operator, delay) in timeouts {
            let _: () = conn
                .hset(&key, operator.as_str(), delay.as_nanos() as u64)
                .await?;
        }
        Ok(())
    }

    /// Read a user's operator timeouts. Unknown fields and unparseable
    /// values are silently dropped.
    pub async fn operator_timeouts(
        &self,
        user_id: i32,
    ) -> DcalcResult<HashMap<Operator, Duration>> {
        let mut conn = self.manager.clone();
        let raw: HashMap<String, String> = conn.hgetall(timeouts_key(user_id)).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(field, value)| {
                let operator = field.parse::<Operator>().ok()?;
                let nanos = value.parse::<u64>().ok()?;
                Some((operator, Duration::from_nanos(nanos)))
            })
            .collect())
    }

    /// Seed a fresh user with the default delay on all four operators.
    pub async fn seed_default_timeouts(&self, user_id: i32, delay: Duration) -> DcalcResult<()> {
        let timeouts = Operator::ALL.into_iter().map(|op| (op, delay)).collect();
        self.set_operator_timeouts(user_id, &timeouts).await
    }

    /// Record a worker heartbeat: last-seen timestamp plus in-flight count.
    pub async fn record_heartbeat(&self, worker_name: &str, in_flight: i64) -> DcalcResult<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        let mut conn = self.manager.clone();
        let _: () = conn.hset(WORKERS_HASH, worker_name, now).await?;
        let _: () = conn
            .hset(WORKER_TASK_COUNT_HASH, worker_name, in_flight)
            .await?;
        Ok(())
    }

    /// Last heartbeat per registered worker. Workers are never removed,
    /// only aged out by the liveness window.
    pub async fn worker_heartbeats(&self) -> DcalcResult<HashMap<String, DateTime<Utc>>> {
        let mut conn = self.manager.clone();
        let raw: HashMap<String, String> = conn.hgetall(WORKERS_HASH).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(name, stamp)| {
                let parsed = DateTime::parse_from_rfc3339(&stamp).ok()?;
                Some((name, parsed.with_timezone(&Utc)))
            })
            .collect())
    }

    pub async fn worker_task_counts(&self) -> DcalcResult<HashMap<String, i64>> {
        let mut conn = self.manager.clone();
        let raw: HashMap<String, String> = conn.hgetall(WORKER_TASK_COUNT_HASH).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(name, count)| Some((name, count.parse().ok()?)))
            .collect())
    }
}
