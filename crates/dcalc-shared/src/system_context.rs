//! # System Context
//!
//! The shared handles a service needs to touch the task store and the
//! broker. Built once at bootstrap and passed explicitly (behind `Arc`)
//! into every loop and handler — no ambient globals.

use sqlx::PgPool;

use crate::messaging::BrokerClient;

#[derive(Debug, Clone)]
pub struct SystemContext {
    pool: PgPool,
    broker: BrokerClient,
}

impl SystemContext {
    pub fn new(pool: PgPool, broker: BrokerClient) -> Self {
        Self { pool, broker }
    }

    pub fn database_pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn broker(&self) -> &BrokerClient {
        &self.broker
    }
}
