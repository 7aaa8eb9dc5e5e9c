//! # Distributor
//!
//! Five independent loops drive operations through their lifecycle. Each
//! loop owns one subset of state transitions, which keeps the pipeline
//! serializable without locks:
//!
//! - **decomposition**: NEW expressions → operation trees (PARTITIONED or
//!   INVALID)
//! - **dispatch**: READY operations with both operands known → broker FIFO →
//!   RUNNING
//! - **ingest**: `results` channel → result column (status untouched)
//! - **promotion**: RUNNING+result → parent operand slots / expression
//!   result → DONE
//! - **recovery**: RUNNING past the global timeout → READY
//!
//! Loops log and continue on per-tick errors; only a lost results
//! subscription faults its task.

pub mod decomposition;
pub mod dispatch;
pub mod ingest;
pub mod promotion;
pub mod recovery;

use std::sync::Arc;

use tokio::task::JoinHandle;

use dcalc_shared::config::OrchestratorConfig;
use dcalc_shared::SystemContext;

/// Spawns and owns the distributor loops.
#[derive(Debug)]
pub struct Distributor {
    context: Arc<SystemContext>,
    config: OrchestratorConfig,
}

impl Distributor {
    pub fn new(context: Arc<SystemContext>, config: OrchestratorConfig) -> Self {
        Self { context, config }
    }

    /// Start every loop on its own task. The handles are aborted at
    /// shutdown; none of the loops hold state worth draining.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(decomposition::run(
                self.context.clone(),
                self.config.decomposition_interval,
            )),
            tokio::spawn(dispatch::run(
                self.context.clone(),
                self.config.dispatch_interval,
            )),
            tokio::spawn(ingest::run(self.context.clone())),
            tokio::spawn(promotion::run(
                self.context.clone(),
                self.config.promotion_interval,
            )),
            tokio::spawn(recovery::run(
                self.context.clone(),
                self.config.recovery_interval,
            )),
        ]
    }
}
