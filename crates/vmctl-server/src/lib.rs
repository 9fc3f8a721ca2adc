//! # vmctl-server: the `/api/v4` HTTP Intake and Capabilities Cache
//!
//! Every mutating endpoint opens one transaction, inserts the
//! `(Request, Machine?, Action)` tuple the operation needs, and
//! returns immediately with a `request_id` the caller polls via `GET
//! /requests/{id}`. Capacity is enforced only at deploy intake, by
//! consulting [`capabilities::Capabilities`] with a forced refresh.
//!
//! Built on `axum` + `tower-http` rather than the bespoke `mio` event
//! loop this crate's non-HTTP siblings are modeled on: the HTTP
//! surface here is a cooperative-async JSON API, not a binary wire
//! protocol, and axum is the idiomatic fit for that shape.

pub mod auth;
pub mod capabilities;
pub mod envelope;
pub mod error;
pub mod routes;
pub mod state;

use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use error::{ServerError, ServerResult};
pub use state::AppState;

/// Builds the full `/api/v4` router over `state`.
#[must_use]
pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_millis(state.settings.http.exception_time_ms);

    Router::new()
        .route("/uptime", get(routes::uptime::uptime))
        .route("/dbuptime", get(routes::uptime::db_uptime))
        .nest(
            "/api/v4",
            Router::new()
                .route("/machines", post(routes::machines::deploy).get(routes::machines::list))
                .route(
                    "/machines/{id}",
                    get(routes::machines::get).delete(routes::machines::delete).put(routes::machines::action),
                )
                .route("/machines/{id}/screenshots", post(routes::screenshots::take))
                .route("/machines/{id}/screenshots/{sid}", get(routes::screenshots::get))
                .route("/machines/{id}/snapshots", post(routes::snapshots::take))
                .route(
                    "/machines/{id}/snapshots/{sid}",
                    put(routes::snapshots::restore).delete(routes::snapshots::delete),
                )
                .route("/requests/{id}", get(routes::requests::get))
                .route("/capabilities", get(routes::capabilities::get))
                .route("/hosts", get(routes::hosts::list))
                .route("/hosts/{id}", get(routes::hosts::get).put(routes::hosts::put))
                .with_state(state.clone()),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
}

/// Serves `router` on `bind_address` until a graceful-shutdown signal
/// (`SIGTERM`/`SIGINT`) arrives.
///
/// # Errors
///
/// Returns an I/O error if the listener cannot bind.
pub async fn serve(bind_address: &str, app: Router, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!(%bind_address, "HTTP Intake listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}
