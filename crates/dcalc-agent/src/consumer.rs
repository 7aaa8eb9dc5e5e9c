//! # Operation Consumer
//!
//! Subscribes to the `operations` notification channel and races peers for
//! the FIFO payload. The notification only says "the list has work" (and for
//! whom it was enqueued); the list itself is global, so the popped operation
//! may belong to a different user than the notification. Timeouts are
//! therefore resolved against the operation's actual owner via the store,
//! with the notified userid as a fallback.

use std::time::Duration;

use futures::StreamExt;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use dcalc_shared::config::DEFAULT_OPERATOR_DELAY;
use dcalc_shared::errors::DcalcResult;
use dcalc_shared::messaging::{BrokerClient, OperationPayload, ResultPayload, OPERATIONS_CHANNEL};
use dcalc_shared::models::Operation;

use crate::pool::{ScheduledOperation, WorkerPool};

#[derive(Debug)]
pub struct OperationConsumer {
    broker: BrokerClient,
    pool: PgPool,
    workers: WorkerPool,
}

impl OperationConsumer {
    pub fn new(broker: BrokerClient, pool: PgPool, workers: WorkerPool) -> Self {
        Self {
            broker,
            pool,
            workers,
        }
    }

    pub async fn run(self) {
        match self.consume().await {
            Ok(()) => error!("operations subscription ended unexpectedly"),
            Err(err) => error!(error = %err, "operations subscription lost"),
        }
    }

    async fn consume(&self) -> DcalcResult<()> {
        let mut pubsub = self.broker.subscribe(OPERATIONS_CHANNEL).await?;
        info!(channel = OPERATIONS_CHANNEL, "consumer subscribed");
        let mut stream = pubsub.on_message();

        while let Some(message) = stream.next().await {
            let notified_user: Option<i32> = message
                .get_payload::<String>()
                .ok()
                .and_then(|raw| raw.parse().ok());
            if let Err(error) = self.handle_notification(notified_user).await {
                warn!(%error, "failed to handle operation notification");
            }
        }
        Ok(())
    }

    async fn handle_notification(&self, notified_user: Option<i32>) -> DcalcResult<()> {
        let Some(payload) = self.broker.pop_operation().await? else {
            debug!("operations list already drained by a peer");
            return Ok(());
        };

        let delay = self.delay_for(&payload, notified_user).await;
        info!(
            operation_id = %payload.operation_id,
            operator = %payload.operator,
            delay_ms = delay.as_millis() as u64,
            "accepted operation"
        );
        if !self.workers.submit(ScheduledOperation { payload, delay }).await {
            // Recovery requeues the operation once its timeout elapses.
            warn!("worker pool is gone, dropping operation");
        }
        Ok(())
    }

    /// The delay configured by the operation's owner for this operator.
    async fn delay_for(
        &self,
        payload: &OperationPayload,
        notified_user: Option<i32>,
    ) -> Duration {
        let owner = match Operation::owner_user_id(&self.pool, payload.operation_id).await {
            Ok(Some(user_id)) => Some(user_id),
            Ok(None) => notified_user,
            Err(error) => {
                warn!(
                    operation_id = %payload.operation_id,
                    %error,
                    "owner lookup failed, falling back to the notified user"
                );
                notified_user
            }
        };
        let Some(owner) = owner else {
            return DEFAULT_OPERATOR_DELAY;
        };

        match self.broker.operator_timeouts(owner).await {
            Ok(timeouts) => timeouts
                .get(&payload.operator)
                .copied()
                .unwrap_or(DEFAULT_OPERATOR_DELAY),
            Err(error) => {
                warn!(user_id = owner, %error, "timeout lookup failed, using default");
                DEFAULT_OPERATOR_DELAY
            }
        }
    }
}

/// Drain the pool's results channel into the broker `results` channel.
pub async fn publish_results(broker: BrokerClient, mut results: mpsc::Receiver<ResultPayload>) {
    while let Some(result) = results.recv().await {
        match broker.publish_result(&result).await {
            Ok(()) => debug!(
                operation_id = %result.operation_id,
                value = result.result,
                "published result"
            ),
            Err(error) => warn!(
                operation_id = %result.operation_id,
                %error,
                "failed to publish result"
            ),
        }
    }
}
