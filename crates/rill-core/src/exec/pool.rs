//! DSN-keyed connection pool manager.
//!
//! One lazy `PgPool` per DSN, created on first use and dropped when the DSN
//! is invalidated (settings change) or at shutdown. Connections are acquired
//! per query and returned on completion.

use std::time::Duration;

use rustc_hash::FxHashMap;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::Mutex;

use super::POOL_MAX_CONNECTIONS;
use crate::error::{Error, Result};

/// Result of a connection liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCheck {
    pub ok: bool,
    pub message: String,
}

/// Pool registry keyed by DSN.
#[derive(Default)]
pub struct PoolManager {
    pools: Mutex<FxHashMap<String, PgPool>>,
}

impl PoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pool for `dsn`, creating it lazily.
    pub async fn get(&self, dsn: &str) -> Result<PgPool> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(dsn) {
            return Ok(pool.clone());
        }
        let pool = connect(dsn, POOL_MAX_CONNECTIONS).await?;
        pools.insert(dsn.to_string(), pool.clone());
        tracing::debug!("created connection pool for dsn");
        Ok(pool)
    }

    /// Probe `dsn` with a `SELECT 1`, wrapping any failure into the message.
    pub async fn test(&self, dsn: &str) -> ConnectionCheck {
        let probe = async {
            let pool = connect(dsn, 1).await?;
            let result: std::result::Result<i32, sqlx::Error> =
                sqlx::query_scalar("SELECT 1").fetch_one(&pool).await;
            pool.close().await;
            match result {
                Ok(1) => Ok(()),
                Ok(other) => Err(Error::Pool(format!(
                    "connection test query returned {other}"
                ))),
                Err(error) => Err(Error::Pool(error.to_string())),
            }
        };
        match probe.await {
            Ok(()) => ConnectionCheck {
                ok: true,
                message: "connection successful".to_string(),
            },
            Err(error) => ConnectionCheck {
                ok: false,
                message: error.to_string(),
            },
        }
    }

    /// Close and drop the pool for `dsn`, if any.
    pub async fn invalidate(&self, dsn: &str) {
        let pool = self.pools.lock().await.remove(dsn);
        if let Some(pool) = pool {
            pool.close().await;
            tracing::debug!("closed connection pool for replaced dsn");
        }
    }

    /// Close every pool; called at shutdown.
    pub async fn close_all(&self) {
        let pools: Vec<PgPool> = self.pools.lock().await.drain().map(|(_, p)| p).collect();
        for pool in pools {
            pool.close().await;
        }
    }
}

async fn connect(dsn: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(dsn)
        .await
        .map_err(|error| Error::Pool(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_dsn_reports_error() {
        let pools = PoolManager::new();
        let check = pools
            .test("postgres://nobody@127.0.0.1:1/does_not_exist")
            .await;
        assert!(!check.ok);
        assert!(!check.message.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_without_pool_is_noop() {
        let pools = PoolManager::new();
        pools.invalidate("postgres://localhost/none").await;
        pools.close_all().await;
    }
}
