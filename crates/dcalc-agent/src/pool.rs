//! # Worker Pool
//!
//! Bounded-concurrency executor for dispatched operations. A fixed set of
//! long-lived executor tasks pulls from a shared channel; each execution
//! sleeps the operator's configured delay (the simulated cost of the
//! operation), computes the binary64 result, and emits it on the results
//! channel. A shared atomic counter tracks in-flight executions for the
//! heartbeat.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use dcalc_shared::messaging::{OperationPayload, ResultPayload};

/// An operation paired with the delay its owner configured for the operator.
#[derive(Debug, Clone)]
pub struct ScheduledOperation {
    pub payload: OperationPayload,
    pub delay: Duration,
}

/// Handle to the executor tasks. Dropping the handle closes the task
/// channel and lets the executors drain and exit.
#[derive(Debug)]
pub struct WorkerPool {
    task_tx: mpsc::Sender<ScheduledOperation>,
    in_flight: Arc<AtomicI64>,
}

impl WorkerPool {
    /// Spawn `max_concurrent` executors and return the pool handle together
    /// with the receiving end of the results channel.
    pub fn start(max_concurrent: usize) -> (Self, mpsc::Receiver<ResultPayload>) {
        let max_concurrent = max_concurrent.max(1);
        let (task_tx, task_rx) = mpsc::channel::<ScheduledOperation>(max_concurrent);
        let (result_tx, result_rx) = mpsc::channel::<ResultPayload>(max_concurrent);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let in_flight = Arc::new(AtomicI64::new(0));

        for executor_id in 0..max_concurrent {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let in_flight = in_flight.clone();
            tokio::spawn(async move {
                loop {
                    // Hold the lock only to receive; execution runs unlocked
                    // so the other executors keep pulling work.
                    let next = { task_rx.lock().await.recv().await };
                    let Some(scheduled) = next else {
                        break;
                    };
                    execute(scheduled, &in_flight, &result_tx, executor_id).await;
                }
            });
        }

        (Self { task_tx, in_flight }, result_rx)
    }

    /// Queue an operation for execution. Returns `false` when the pool has
    /// shut down; the caller drops the operation and lets recovery requeue
    /// it.
    pub async fn submit(&self, scheduled: ScheduledOperation) -> bool {
        self.task_tx.send(scheduled).await.is_ok()
    }

    /// Current number of executing operations.
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Shared counter handle for the heartbeat task.
    pub fn in_flight_counter(&self) -> Arc<AtomicI64> {
        self.in_flight.clone()
    }
}

async fn execute(
    scheduled: ScheduledOperation,
    in_flight: &AtomicI64,
    result_tx: &mpsc::Sender<ResultPayload>,
    executor_id: usize,
) {
    let ScheduledOperation { payload, delay } = scheduled;
    let (Some(v1), Some(v2)) = (payload.v1, payload.v2) else {
        warn!(
            operation_id = %payload.operation_id,
            "operation arrived with a pending operand, dropping"
        );
        return;
    };

    in_flight.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(delay).await;
    let value = payload.operator.apply(v1, v2);
    in_flight.fetch_sub(1, Ordering::SeqCst);

    debug!(
        executor_id,
        operation_id = %payload.operation_id,
        operator = %payload.operator,
        value,
        "operation executed"
    );
    let _ = result_tx
        .send(ResultPayload {
            operation_id: payload.operation_id,
            result: value,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcalc_shared::models::{OperationStatus, Operator};
    use uuid::Uuid;

    fn scheduled(operator: Operator, v1: f64, v2: f64, delay: Duration) -> ScheduledOperation {
        ScheduledOperation {
            payload: OperationPayload {
                expression_id: "expr".into(),
                operator,
                v1: Some(v1),
                v2: Some(v2),
                operation_id: Uuid::new_v4(),
                parent_id: "expr".into(),
                left: false,
                status: OperationStatus::Running,
                result: None,
            },
            delay,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn executes_operations_after_their_configured_delay() {
        let (pool, mut results) = WorkerPool::start(2);

        assert!(pool
            .submit(scheduled(Operator::Add, 2.0, 3.0, Duration::from_secs(1)))
            .await);
        assert!(pool
            .submit(scheduled(Operator::Div, 5.0, 5.0, Duration::from_secs(10)))
            .await);

        let first = results.recv().await.expect("first result");
        let second = results.recv().await.expect("second result");
        // The shorter delay finishes first even though both were queued
        // together.
        assert_eq!(first.result, 5.0);
        assert_eq!(second.result, 1.0);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn a_single_executor_serializes_work() {
        let (pool, mut results) = WorkerPool::start(1);

        pool.submit(scheduled(Operator::Mul, 3.0, 7.0, Duration::from_secs(5)))
            .await;
        pool.submit(scheduled(Operator::Sub, 10.0, 6.0, Duration::from_secs(1)))
            .await;

        // With one executor the queue order wins regardless of delays.
        assert_eq!(results.recv().await.unwrap().result, 21.0);
        assert_eq!(results.recv().await.unwrap().result, 4.0);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn operations_with_pending_operands_are_dropped() {
        let (pool, mut results) = WorkerPool::start(1);

        let mut incomplete = scheduled(Operator::Add, 0.0, 0.0, Duration::ZERO);
        incomplete.payload.v2 = None;
        pool.submit(incomplete).await;
        pool.submit(scheduled(Operator::Add, 1.0, 1.0, Duration::ZERO))
            .await;

        // Only the complete operation produces a result.
        assert_eq!(results.recv().await.unwrap().result, 2.0);
        assert_eq!(pool.in_flight(), 0);
    }
}
