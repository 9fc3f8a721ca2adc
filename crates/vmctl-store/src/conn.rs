//! Connection Manager: blocking and cooperative-async pools over the
//! same PostgreSQL database.
//!
//! Worker loops (deploy worker, ops worker, reaper, ticket scheduler,
//! host-info obtainer) each own a single connection out of
//! [`BlockingPool`] for the lifetime of the process — one thread, one
//! connection, no handoff. The HTTP Intake instead drives many
//! concurrent requests over a shared [`AsyncPool`], where a query is
//! wrapped in a deadline so a slow database never stalls an HTTP worker
//! indefinitely.

use std::time::Duration;

use deadpool_postgres::{Config as DeadpoolConfig, Runtime};
use r2d2_postgres::postgres::NoTls as BlockingNoTls;
use r2d2_postgres::PostgresConnectionManager;
use tokio_postgres::NoTls as AsyncNoTls;
use tracing::warn;

use crate::error::{Result, StoreError};

/// Blocking connection pool backed by `r2d2` + `r2d2_postgres`. Used by
/// every worker-loop binary: each loop iteration borrows a pooled
/// connection, runs its query or transaction, and returns it.
pub type BlockingPool = r2d2::Pool<PostgresConnectionManager<BlockingNoTls>>;
pub type BlockingConn = r2d2::PooledConnection<PostgresConnectionManager<BlockingNoTls>>;

/// Builds a blocking pool from a `postgres`-style connection string
/// (`host=... user=... password=... dbname=...`).
///
/// # Errors
///
/// Returns [`StoreError::Pool`] if the manager cannot be constructed or
/// the pool cannot establish its initial connections.
pub fn blocking_pool(conn_str: &str, max_size: u32) -> Result<BlockingPool> {
    let config: postgres::Config = conn_str.parse().map_err(StoreError::Database)?;
    let manager = PostgresConnectionManager::new(config, BlockingNoTls);
    r2d2::Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(StoreError::Pool)
}

/// Cooperative-async connection pool backed by `deadpool-postgres` over
/// `tokio-postgres`. Every checked-out connection drives its I/O on a
/// task deadpool spawns; callers just `.await` queries, mirroring the
/// original system's `select()`-on-socket-readiness wait loop without
/// the caller ever touching raw file descriptors.
pub type AsyncPool = deadpool_postgres::Pool;

/// Builds an async pool. `conn_str` uses the same DSN syntax as
/// [`blocking_pool`].
///
/// # Errors
///
/// Returns [`StoreError::AsyncPool`] if pool construction fails (e.g.
/// an unparsable DSN).
pub fn async_pool(conn_str: &str, max_size: usize) -> Result<AsyncPool> {
    let pg_config: tokio_postgres::Config = conn_str.parse().map_err(StoreError::AsyncDatabase)?;
    let mut cfg = DeadpoolConfig::new();
    cfg.host = pg_config.get_hosts().first().and_then(|h| match h {
        tokio_postgres::config::Host::Tcp(s) => Some(s.clone()),
        #[allow(unreachable_patterns)]
        _ => None,
    });
    cfg.dbname = pg_config.get_dbname().map(str::to_string);
    cfg.user = pg_config.get_user().map(str::to_string);
    cfg.password = pg_config
        .get_password()
        .map(|p| String::from_utf8_lossy(p).into_owned());
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(max_size));
    cfg.create_pool(Some(Runtime::Tokio1), AsyncNoTls)
        .map_err(|e| StoreError::UnsupportedFilter(e.to_string()))
}

/// Thresholds governing how long a cooperative-async call is allowed to
/// take before it starts complaining, and how long before it gives up.
///
/// Mirrors the original system's distinction between a connection
/// retry budget and a hard per-call deadline: `warning_time` logs a
/// `tracing::warn!` so slow queries show up in observability without
/// failing the request, `exception_time` aborts the call with
/// [`StoreError::AsyncTimeout`].
#[derive(Debug, Clone, Copy)]
pub struct AsyncDeadline {
    pub warning_time: Duration,
    pub exception_time: Duration,
}

impl Default for AsyncDeadline {
    fn default() -> Self {
        Self {
            warning_time: Duration::from_millis(500),
            exception_time: Duration::from_secs(5),
        }
    }
}

/// Runs `fut` under [`AsyncDeadline`] semantics: logs a warning once
/// `warning_time` elapses, and fails with [`StoreError::AsyncTimeout`]
/// once `exception_time` elapses.
///
/// # Errors
///
/// Returns the future's own error if it completes in time, or
/// [`StoreError::AsyncTimeout`] if `exception_time` is reached first.
pub async fn with_deadline<F, T, E>(deadline: AsyncDeadline, label: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = std::result::Result<T, E>>,
    StoreError: From<E>,
{
    tokio::pin!(fut);
    match tokio::time::timeout(deadline.warning_time, &mut fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => {
            warn!(%label, warning_time_ms = deadline.warning_time.as_millis(), "slow async database call");
            let remaining = deadline.exception_time.saturating_sub(deadline.warning_time);
            match tokio::time::timeout(remaining, fut).await {
                Ok(result) => result.map_err(StoreError::from),
                Err(_) => Err(StoreError::AsyncTimeout(deadline.exception_time)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_deadline_passes_through_fast_ok() {
        let deadline = AsyncDeadline {
            warning_time: Duration::from_millis(50),
            exception_time: Duration::from_millis(200),
        };
        let result: Result<u32> =
            with_deadline(deadline, "fast", async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn with_deadline_times_out_past_exception_time() {
        let deadline = AsyncDeadline {
            warning_time: Duration::from_millis(10),
            exception_time: Duration::from_millis(30),
        };
        let result: Result<u32> = with_deadline(deadline, "slow", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, StoreError>(1)
        })
        .await;
        assert!(matches!(result, Err(StoreError::AsyncTimeout(_))));
    }
}
