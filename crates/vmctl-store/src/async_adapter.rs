//! Async counterpart of [`crate::adapter`], generic over
//! `tokio_postgres::GenericClient` instead of `postgres::GenericClient`.
//!
//! The HTTP Intake drives the same `documents` table through
//! `deadpool-postgres`'s cooperative-async client; the SQL and the
//! JSONB encode/decode steps are identical to the blocking adapter,
//! only the driver differs, so this module mirrors `adapter.rs`
//! function-for-function rather than trying to unify the two drivers
//! behind one trait.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::GenericClient;

use vmctl_types::Document;

use crate::error::{Result, StoreError};
use crate::filter::build_where_clause_from;

/// Async equivalent of [`crate::adapter::insert`].
///
/// # Errors
///
/// Returns [`StoreError::AsyncDatabase`] on a query failure.
pub async fn insert<C, T>(conn: &C, mut doc: T) -> Result<T>
where
    C: GenericClient,
    T: Document + Serialize + DeserializeOwned,
{
    let data = serde_json::to_value(&doc)?;
    let row = conn
        .query_one(
            "INSERT INTO documents (type, data) VALUES ($1, $2) RETURNING id",
            &[&T::type_name(), &data],
        )
        .await?;
    let id: i64 = row.get(0);
    doc.set_id(id);
    Ok(doc)
}

/// Async equivalent of [`crate::adapter::get_by_id`].
///
/// # Errors
///
/// Returns [`StoreError::AsyncDatabase`] on a query failure, or
/// [`StoreError::Decode`] if the stored JSON doesn't match `T`.
pub async fn get_by_id<C, T>(conn: &C, id: i64) -> Result<Option<T>>
where
    C: GenericClient,
    T: Document + DeserializeOwned,
{
    let row = conn
        .query_opt(
            "SELECT id, data FROM documents WHERE type = $1 AND id = $2",
            &[&T::type_name(), &id],
        )
        .await?;
    row.map(|r| decode_row(r.get(0), r.get(1))).transpose()
}

/// Async equivalent of [`crate::adapter::find`].
///
/// # Errors
///
/// Returns [`StoreError::UnsupportedFilter`] if a filter value can't be
/// rendered as SQL text, or [`StoreError::AsyncDatabase`]/[`StoreError::Decode`]
/// on query or decode failure.
pub async fn find<C, T>(conn: &C, filters: &[(String, Value)]) -> Result<Vec<T>>
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
    let rows = conn.query(&sql, &bound).await?;
    rows.into_iter()
        .map(|r| decode_row(r.get(0), r.get(1)))
        .collect()
}

/// Async equivalent of [`crate::adapter::update`].
///
/// # Errors
///
/// Returns [`StoreError::MissingId`] if `doc` was never inserted, or
/// [`StoreError::AsyncDatabase`] on a query failure.
pub async fn update<C, T>(conn: &C, doc: &T) -> Result<()>
where
    C: GenericClient,
    T: Document + Serialize,
{
    let id = doc.id().ok_or(StoreError::MissingId)?;
    let data = serde_json::to_value(doc)?;
    conn.execute(
        "UPDATE documents SET data = $1 WHERE type = $2 AND id = $3",
        &[&data, &T::type_name(), &id],
    )
    .await?;
    Ok(())
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
        format!("AND {}", &where_clause["WHERE ".len()..])
    }
}
