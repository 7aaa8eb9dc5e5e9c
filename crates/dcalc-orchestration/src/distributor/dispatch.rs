//! # Dispatch Loop
//!
//! Moves READY operations with both operands known onto the broker FIFO and
//! flips them to RUNNING. Payloads are pushed (and the owning userid
//! published) before the bulk status change: if the status write is lost,
//! the recovery loop re-READYs the rows and a duplicate push is absorbed by
//! the deduplicating transitions downstream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use dcalc_shared::errors::DcalcResult;
use dcalc_shared::messaging::{OperationPayload, WorkerStatus};
use dcalc_shared::models::{Operation, OperationStatus};
use dcalc_shared::SystemContext;

pub async fn run(context: Arc<SystemContext>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match tick(&context).await {
            Ok(0) => {}
            Ok(count) => info!(operations = count, "dispatched operations"),
            Err(error) => warn!(%error, "dispatch tick failed"),
        }
    }
}

/// Workers counted as dispatch capacity: heartbeat within the liveness
/// window.
pub fn live_worker_count(heartbeats: &HashMap<String, DateTime<Utc>>, now: DateTime<Utc>) -> usize {
    heartbeats
        .values()
        .filter(|last_seen| WorkerStatus::from_last_seen(**last_seen, now) == WorkerStatus::Ok)
        .count()
}

/// Dispatch every ready operation; returns how many went out.
pub async fn tick(context: &SystemContext) -> DcalcResult<usize> {
    let pool = context.database_pool();
    let ready = Operation::ready(pool).await?;
    if ready.is_empty() {
        return Ok(0);
    }

    let heartbeats = context.broker().worker_heartbeats().await?;
    if live_worker_count(&heartbeats, Utc::now()) == 0 {
        debug!(
            ready = ready.len(),
            "no live workers, holding dispatch this tick"
        );
        return Ok(0);
    }

    let mut dispatched: Vec<Uuid> = Vec::with_capacity(ready.len());
    for operation in &ready {
        let Some(user_id) = Operation::owner_user_id(pool, operation.operation_id).await? else {
            warn!(
                operation_id = %operation.operation_id,
                "operation has no owning user, skipping dispatch"
            );
            continue;
        };
        context
            .broker()
            .enqueue_operation(&OperationPayload::from(operation), user_id)
            .await?;
        dispatched.push(operation.operation_id);
    }

    Operation::bulk_set_status(pool, &dispatched, OperationStatus::Running).await?;
    Ok(dispatched.len())
}
