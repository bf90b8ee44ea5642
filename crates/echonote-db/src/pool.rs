//! PostgreSQL pool setup.
//!
//! The pipeline holds connections only for short conditional UPDATEs, so
//! the pool stays small; sizing beyond `max_connections` is not exposed.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use echonote_core::{Error, Result};

/// Pool sizing knobs. The defaults suit a single worker process.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// How long `acquire` waits before giving up.
    pub acquire_timeout: Duration,
    /// Idle connections past this age are closed.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Open a pool against `database_url` with the default sizing.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Open a pool with explicit sizing.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        max_connections = config.max_connections,
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        "Connection pool ready"
    );
    Ok(pool)
}
