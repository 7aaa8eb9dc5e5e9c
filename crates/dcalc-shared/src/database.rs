//! # Database
//!
//! Task store pool construction and embedded migrations. The store is the
//! source of truth for every expression and operation state transition, so
//! the orchestrator runs migrations at bootstrap before any loop starts.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::DcalcResult;

/// Embedded schema migrations; also used by `#[sqlx::test(migrator = ...)]`
/// integration tests.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connect to the task store and verify the connection.
pub async fn connect(config: &DatabaseConfig) -> DcalcResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.url())
        .await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    info!(host = %config.host, database = %config.database, "connected to task store");
    Ok(pool)
}

/// Bring the schema up to date.
pub async fn migrate(pool: &PgPool) -> DcalcResult<()> {
    MIGRATOR.run(pool).await?;
    Ok(())
}
