//! Connection pool setup for the pipeline's Postgres store.

use invpipe_core::error::{Error, Result};
use sqlx::postgres::{PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::time::Duration;

/// Pool sizing and connection parameters, sourced from `AppConfig::database`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl PoolConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// A connected pool plus the health-check query the health crate drives.
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn new(config: PoolConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| Error::database_with_source("failed to connect to database", e))?;

        Ok(Self { pool })
    }

    /// For tests that need a specific SSL mode, bypassing the config loader.
    pub fn ssl_mode_from_env() -> PgSslMode {
        match std::env::var("DATABASE_SSL_MODE").as_deref() {
            Ok("require") => PgSslMode::Require,
            Ok("disable") => PgSslMode::Disable,
            _ => PgSslMode::Prefer,
        }
    }

    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// `SELECT 1` round trip, used by the readiness probe (spec §6).
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database_with_source("health check query failed", e))?;
        Ok(())
    }

    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    pub fn num_idle(&self) -> usize {
        self.pool.num_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::new("postgres://localhost/test");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 2);
    }
}
