//! # dcalc Compute Agent
//!
//! A host-level worker process: consumes dispatched operations from the
//! broker FIFO, executes them on a bounded pool with per-operator simulated
//! delays, publishes results back, and reports liveness to the orchestrator
//! once a second.

pub mod bootstrap;
pub mod consumer;
pub mod heartbeat;
pub mod pool;
