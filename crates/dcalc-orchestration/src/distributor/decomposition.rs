//! # Decomposition Loop
//!
//! Picks up NEW expressions and turns each into its operation tree. One
//! concurrent unit per expression, joined before the next tick. A rejected
//! expression is terminal (INVALID) and never retried; operation-id
//! collisions on re-insert are absorbed by the store, so a crashed tick can
//! safely run again.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use dcalc_shared::errors::DcalcResult;
use dcalc_shared::expr;
use dcalc_shared::models::{Expression, ExpressionStatus, Operation};
use dcalc_shared::SystemContext;

pub async fn run(context: Arc<SystemContext>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match tick(&context).await {
            Ok(0) => {}
            Ok(count) => info!(expressions = count, "decomposition tick finished"),
            Err(error) => warn!(%error, "decomposition tick failed"),
        }
    }
}

/// Decompose every unpartitioned expression; returns how many were handled.
pub async fn tick(context: &Arc<SystemContext>) -> DcalcResult<usize> {
    let pending = Expression::unpartitioned(context.database_pool()).await?;
    if pending.is_empty() {
        return Ok(0);
    }

    let units = pending.into_iter().map(|expression| {
        let context = context.clone();
        tokio::spawn(async move {
            if let Err(error) = decompose_one(&context, &expression).await {
                warn!(
                    expression_id = %expression.expression_id,
                    %error,
                    "failed to partition expression"
                );
            }
        })
    });
    let handled = join_all(units).await.len();
    Ok(handled)
}

async fn decompose_one(context: &SystemContext, expression: &Expression) -> DcalcResult<()> {
    let pool = context.database_pool();
    match expr::decompose(&expression.expression_id, &expression.expression) {
        Err(error) => {
            warn!(
                expression_id = %expression.expression_id,
                %error,
                "expression rejected at decomposition"
            );
            Expression::set_status(pool, &expression.expression_id, ExpressionStatus::Invalid)
                .await
        }
        Ok(operations) => {
            Operation::bulk_insert(pool, &operations).await?;
            Expression::set_status(
                pool,
                &expression.expression_id,
                ExpressionStatus::Partitioned,
            )
            .await?;
            info!(
                expression_id = %expression.expression_id,
                operations = operations.len(),
                "expression partitioned"
            );
            Ok(())
        }
    }
}
