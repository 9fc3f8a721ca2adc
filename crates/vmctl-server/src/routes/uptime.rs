//! `GET /uptime`: liveness probe, no DB round-trip.

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

pub async fn uptime() -> Response {
    Json(json!({
        "current_time": Utc::now().to_rfc3339(),
        "host": hostname(),
    }))
    .into_response()
}

/// Also probes the document store, surfacing a DB outage in the same
/// response shape as plain liveness.
pub async fn db_uptime(State(state): State<AppState>) -> Response {
    let db_ok = state.pool.get().await.is_ok();
    Json(json!({
        "current_time": Utc::now().to_rfc3339(),
        "host": hostname(),
        "db": db_ok,
    }))
    .into_response()
}

fn hostname() -> String {
    hostname_impl()
}

#[cfg(unix)]
fn hostname_impl() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(not(unix))]
fn hostname_impl() -> String {
    "unknown".to_string()
}
