//! Error types for the document store and connection manager.

use thiserror::Error;

/// Errors raised by [`crate::adapter`] and [`crate::conn`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The blocking connection pool (`r2d2`) failed to hand out a
    /// connection, typically because the pool is exhausted or the
    /// database is unreachable.
    #[error("blocking pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A query against the `postgres` (blocking) driver failed.
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),

    /// A query against the `tokio-postgres` (async) driver failed.
    #[error("async database error: {0}")]
    AsyncDatabase(#[from] tokio_postgres::Error),

    /// The async pool (`deadpool-postgres`) failed to hand out a
    /// connection.
    #[error("async pool error: {0}")]
    AsyncPool(#[from] deadpool_postgres::PoolError),

    /// A cooperative-async call exceeded `exception_time` without the
    /// underlying query completing.
    #[error("async call exceeded exception_time ({0:?})")]
    AsyncTimeout(std::time::Duration),

    /// A document row's `data` column failed to deserialize into the
    /// requested entity type.
    #[error("document decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A document with no assigned id was passed where the store
    /// expected an already-persisted row (e.g. to `update`).
    #[error("document has no id")]
    MissingId,

    /// A claim query (`FOR UPDATE SKIP LOCKED`) found no eligible row.
    #[error("no row available to claim")]
    NothingToClaim,

    /// An unsupported filter key or value shape was given to the
    /// filter-to-predicate translator.
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
