//! # Recovery Loop
//!
//! Re-queues operations lost to agent failure. The threshold is the maximum
//! operator timeout configured by any user (an agent may legitimately hold
//! an operation for that long), floored at the default operator delay. The
//! DONE-without-result clause guards against a lost promotion write.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tracing::{info, warn};

use dcalc_shared::config::DEFAULT_OPERATOR_DELAY;
use dcalc_shared::errors::DcalcResult;
use dcalc_shared::models::{Operation, User};
use dcalc_shared::SystemContext;

pub async fn run(context: Arc<SystemContext>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match tick(&context).await {
            Ok(0) => {}
            Ok(count) => info!(operations = count, "requeued stuck operations"),
            Err(error) => warn!(%error, "recovery tick failed"),
        }
    }
}

/// Reset stuck operations to READY; returns how many rows were touched.
pub async fn tick(context: &SystemContext) -> DcalcResult<u64> {
    let pool = context.database_pool();

    let mut timeout = DEFAULT_OPERATOR_DELAY;
    for user_id in User::all_ids(pool).await? {
        for delay in context.broker().operator_timeouts(user_id).await?.values() {
            timeout = timeout.max(*delay);
        }
    }

    let cutoff = Utc::now()
        - TimeDelta::from_std(timeout).unwrap_or_else(|_| {
            TimeDelta::from_std(DEFAULT_OPERATOR_DELAY).expect("default delay fits")
        });
    Operation::reset_stuck(pool, cutoff).await
}
