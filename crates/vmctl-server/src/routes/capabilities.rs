//! `GET /capabilities`.

use axum::extract::State;
use axum::response::Response;

use crate::envelope::{single, ResponseElement};
use crate::error::ServerResult;
use crate::state::AppState;

pub async fn get(State(state): State<AppState>) -> ServerResult<Response> {
    let client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let snapshot = state.capabilities.fetch(&client, false).await?;
    Ok(single(ResponseElement::return_value(snapshot.to_json(), true)))
}
