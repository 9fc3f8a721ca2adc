//! Document Store Adapter: generic persistence for any [`Document`]
//! over the single polymorphic `documents` table.
//!
//! ```sql
//! CREATE TABLE documents (
//!     id   BIGSERIAL PRIMARY KEY,
//!     type TEXT NOT NULL,
//!     data JSONB NOT NULL
//! );
//! ```
//!
//! Every entity is serialized into `data` and tagged with its
//! [`Document::type_name`] in `type`; queries always filter on `type`
//! first so one table can hold every kind of row without a join.

use postgres::types::ToSql;
use postgres::GenericClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use vmctl_types::Document;

use crate::error::{Result, StoreError};
use crate::filter::build_where_clause_from;

/// Inserts `doc` and returns it with its assigned id populated.
///
/// Generic over [`GenericClient`] so the same function runs against a
/// pooled [`crate::conn::BlockingConn`] (deref to `postgres::Client`)
/// or an open `postgres::Transaction` — worker loops use the former for
/// single-statement writes and the latter when a claim-and-update must
/// stay atomic.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on a query failure.
pub fn insert<C, T>(conn: &mut C, mut doc: T) -> Result<T>
where
    C: GenericClient,
    T: Document + Serialize + DeserializeOwned,
{
    let data = serde_json::to_value(&doc)?;
    let row = conn.query_one(
        "INSERT INTO documents (type, data) VALUES ($1, $2) RETURNING id",
        &[&T::type_name(), &data],
    )?;
    let id: i64 = row.get(0);
    doc.set_id(id);
    Ok(doc)
}

/// Fetches a single document by primary key.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on a query failure, or
/// [`StoreError::Decode`] if the stored JSON doesn't match `T`.
pub fn get_by_id<C, T>(conn: &mut C, id: i64) -> Result<Option<T>>
where
    C: GenericClient,
    T: Document + DeserializeOwned,
{
    let row = conn.query_opt(
        "SELECT id, data FROM documents WHERE type = $1 AND id = $2",
        &[&T::type_name(), &id],
    )?;
    row.map(|r| decode_row(r.get(0), r.get(1))).transpose()
}

/// Lists every document of type `T` matching `filters` (an empty slice
/// matches everything), ordered by ascending id — this is the FIFO
/// order claim queries and list endpoints both rely on.
///
/// # Errors
///
/// Returns [`StoreError::UnsupportedFilter`] if a filter value can't be
/// rendered as SQL text, or [`StoreError::Database`]/[`StoreError::Decode`]
/// on query or decode failure.
pub fn find<C, T>(conn: &mut C, filters: &[(String, Value)]) -> Result<Vec<T>>
where
    C: GenericClient,
    T: Document + DeserializeOwned,
{
    let (where_clause, params) = build_where_clause_from(filters, 2)?;
    let sql = format!(
        "SELECT id, data FROM documents WHERE type = $1 {} ORDER BY id ASC",
        as_and_clause(&where_clause)
    );
    let type_name = T::type_name();
    let mut bound: Vec<&(dyn ToSql + Sync)> = vec![&type_name];
    for p in &params {
        bound.push(p);
    }
    let rows = conn.query(&sql, &bound)?;
    rows.into_iter()
        .map(|r| decode_row(r.get(0), r.get(1)))
        .collect()
}

/// Overwrites the `data` column of an already-persisted document.
///
/// # Errors
///
/// Returns [`StoreError::MissingId`] if `doc` was never inserted, or
/// [`StoreError::Database`] on a query failure.
pub fn update<C, T>(conn: &mut C, doc: &T) -> Result<()>
where
    C: GenericClient,
    T: Document + Serialize,
{
    let id = doc.id().ok_or(StoreError::MissingId)?;
    let data = serde_json::to_value(doc)?;
    conn.execute(
        "UPDATE documents SET data = $1 WHERE type = $2 AND id = $3",
        &[&data, &T::type_name(), &id],
    )?;
    Ok(())
}

/// Deletes a document by id. No-op if it doesn't exist.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on a query failure.
pub fn delete<C, T>(conn: &mut C, id: i64) -> Result<()>
where
    C: GenericClient,
    T: Document,
{
    conn.execute(
        "DELETE FROM documents WHERE type = $1 AND id = $2",
        &[&T::type_name(), &id],
    )?;
    Ok(())
}

/// Claims the oldest document of type `T` whose JSONB `lock` field
/// equals `free_value`, using `SELECT ... FOR UPDATE SKIP LOCKED` so
/// concurrent workers never block on each other or double-claim a row.
/// Returns `None` if nothing is currently claimable.
///
/// `extra_filters` narrows the candidate set further (e.g. `next_try <=
/// now()`), applied in addition to the lock-field match.
///
/// # Errors
///
/// Returns [`StoreError::Database`]/[`StoreError::Decode`] on failure.
/// Does not itself manage the transaction — callers run this inside a
/// transaction from [`crate::tx::with_tx`] so the row stays locked
/// until the caller commits its own state change.
pub fn claim_one_for_update_skip_locked<T>(
    tx: &mut Transaction<'_>,
    lock_attribute: &str,
    free_value: i32,
    extra_sql: &str,
) -> Result<Option<T>>
where
    T: Document + DeserializeOwned,
{
    let sql = format!(
        "SELECT id, data FROM documents \
         WHERE type = $1 AND (data->>'{lock_attribute}')::int = $2 {extra_sql} \
         ORDER BY id ASC LIMIT 1 FOR UPDATE SKIP LOCKED"
    );
    let row = tx.query_opt(&sql, &[&T::type_name(), &free_value])?;
    row.map(|r| decode_row(r.get(0), r.get(1))).transpose()
}

fn decode_row<T: Document + DeserializeOwned>(id: i64, data: Value) -> Result<T> {
    let mut doc: T = serde_json::from_value(data)?;
    doc.set_id(id);
    Ok(doc)
}

fn as_and_clause(where_clause: &str) -> String {
    if where_clause.is_empty() {
        String::new()
    } else {
        // build_where_clause_from always emits "WHERE ...", we want
        // "AND ..." here since `type = $1` already anchors the query.
        format!("AND {}", &where_clause["WHERE ".len()..])
    }
}
