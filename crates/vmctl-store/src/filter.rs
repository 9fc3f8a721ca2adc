//! Translation of a caller-supplied filter map into a SQL `WHERE`
//! clause over the `documents.data` JSONB column.
//!
//! A filter is a `{attribute: value}` map. Every key except the
//! special `_id` is compared against `data->>key` (JSONB's
//! text-extraction operator), so filter values are always matched as
//! text. `_id` is the one key that maps to the real `id` primary-key
//! column instead of a JSONB path, since claim queries and direct
//! lookups need an indexed integer comparison rather than a JSONB scan.

use serde_json::Value;

use crate::error::{Result, StoreError};

/// The special filter key that addresses the `documents.id` column
/// directly instead of a path inside `data`.
pub const ID_KEY: &str = "_id";

/// Renders `filters` into a `WHERE ...` SQL fragment (or an empty
/// string when `filters` is empty) plus its bound parameters.
/// Placeholder numbering starts at `$1`; use
/// [`build_where_clause_from`] when the clause is appended after other
/// bound parameters.
///
/// # Errors
///
/// Returns [`StoreError::UnsupportedFilter`] if a value's JSON type has
/// no text representation the translator knows how to bind (only
/// strings, numbers, bools and null are supported — arrays/objects are
/// rejected since `data->>k = $n` only ever compares scalars).
pub fn build_where_clause(filters: &[(String, Value)]) -> Result<(String, Vec<String>)> {
    build_where_clause_from(filters, 1)
}

/// Like [`build_where_clause`] but numbers placeholders starting at
/// `start` (e.g. `start = 2` when `$1` is already bound to `type`).
///
/// # Errors
///
/// Same as [`build_where_clause`].
pub fn build_where_clause_from(
    filters: &[(String, Value)],
    start: usize,
) -> Result<(String, Vec<String>)> {
    if filters.is_empty() {
        return Ok((String::new(), Vec::new()));
    }

    let mut clauses = Vec::with_capacity(filters.len());
    let mut params = Vec::with_capacity(filters.len());
    for (idx, (key, value)) in filters.iter().enumerate() {
        let placeholder = start + idx;
        let text = scalar_to_text(value)?;
        if key == ID_KEY {
            clauses.push(format!("id = ${placeholder}::bigint"));
        } else {
            clauses.push(format!("data->>'{}' = ${placeholder}", escape_json_key(key)));
        }
        params.push(text);
    }

    Ok((format!("WHERE {}", clauses.join(" AND ")), params))
}

fn scalar_to_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(StoreError::UnsupportedFilter(format!(
            "cannot compare non-scalar value {other}"
        ))),
    }
}

/// Guards against a filter key breaking out of the `->>'...'` literal;
/// single quotes are the only character JSONB path literals need
/// escaped, since keys never contain unicode escapes here.
fn escape_json_key(key: &str) -> String {
    key.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filters_yield_no_clause() {
        let (clause, params) = build_where_clause(&[]).unwrap();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn id_filter_targets_primary_key_column() {
        let (clause, params) = build_where_clause(&[(ID_KEY.to_string(), json!(42))]).unwrap();
        assert_eq!(clause, "WHERE id = $1::bigint");
        assert_eq!(params, vec!["42".to_string()]);
    }

    #[test]
    fn attribute_filter_targets_jsonb_path() {
        let (clause, params) =
            build_where_clause(&[("state".to_string(), json!("running"))]).unwrap();
        assert_eq!(clause, "WHERE data->>'state' = $1");
        assert_eq!(params, vec!["running".to_string()]);
    }

    #[test]
    fn non_scalar_filter_is_rejected() {
        let err = build_where_clause(&[("labels".to_string(), json!(["a", "b"]))]).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFilter(_)));
    }
}
