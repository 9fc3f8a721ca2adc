//! Scoped transaction helper.
//!
//! Mirrors the original system's `Connection` context manager: `BEGIN`
//! on entry, `COMMIT` if the closure returns `Ok`, `ROLLBACK` (with a
//! warning log) if it returns `Err`. Rust's ownership rules make the
//! "commit on success, rollback otherwise" rule a single `match`
//! instead of `__enter__`/`__exit__`.

use postgres::Transaction;
use tracing::warn;

use crate::conn::BlockingConn;

/// Runs `body` inside a transaction on `conn`, committing on `Ok` and
/// rolling back on `Err`.
///
/// Generic over the body's error type so callers outside this crate
/// (worker loops composing their own error enum out of
/// [`crate::error::StoreError`] plus other sources) can run their own
/// fallible logic in a transaction without wrapping every error back
/// into `StoreError` first.
///
/// # Errors
///
/// Propagates whatever error `body` returns, or the `BEGIN`/`COMMIT`/
/// `ROLLBACK` failure converted via `E::from` if the transaction itself
/// fails.
pub fn with_tx<F, T, E>(conn: &mut BlockingConn, body: F) -> std::result::Result<T, E>
where
    F: FnOnce(&mut Transaction<'_>) -> std::result::Result<T, E>,
    E: From<postgres::Error> + std::fmt::Display,
{
    let mut tx = conn.transaction()?;
    match body(&mut tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            warn!(error = %err, "rolling back transaction after error");
            tx.rollback()?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    // Exercised indirectly by vmctl-workers' claim-loop tests against a
    // real database; a unit test here would need a live PostgreSQL
    // instance and is intentionally left to integration testing.
}
