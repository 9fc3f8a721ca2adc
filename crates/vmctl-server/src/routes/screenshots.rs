//! `POST /machines/{id}/screenshots`, `GET /machines/{id}/screenshots/{sid}`.

use axum::extract::{Path, State};
use axum::response::Response;
use serde_json::json;

use vmctl_store::async_adapter;
use vmctl_types::{Action, Machine, Request, RequestType, Screenshot};

use crate::envelope::raw;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub async fn take(State(state): State<AppState>, Path(machine_id): Path<i64>) -> ServerResult<Response> {
    let mut client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let tx = client.transaction().await.map_err(vmctl_store::StoreError::from)?;

    let mut machine: Machine = async_adapter::get_by_id(&tx, machine_id).await?.ok_or(ServerError::NotFound)?;

    let screenshot = async_adapter::insert(&tx, Screenshot::new(machine_id.to_string())).await?;
    machine.screenshots.push(screenshot.id.unwrap_or_default().to_string());
    async_adapter::update(&tx, &machine).await?;

    let mut new_request = Request::new(RequestType::TakeScreenshot, machine_id.to_string(), screenshot.id.unwrap_or_default().to_string());
    new_request = async_adapter::insert(&tx, new_request).await?;
    async_adapter::insert(&tx, Action::new("other", new_request.id.unwrap_or_default().to_string())).await?;

    tx.commit().await.map_err(vmctl_store::StoreError::from)?;

    Ok(raw(vec![json!({
        "result": { "screenshot_id": screenshot.id.unwrap_or_default().to_string() },
        "is_last": true,
    })]))
}

pub async fn get(
    State(state): State<AppState>,
    Path((_machine_id, screenshot_id)): Path<(i64, i64)>,
) -> ServerResult<Response> {
    let client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let screenshot: Screenshot = async_adapter::get_by_id(&*client, screenshot_id)
        .await?
        .ok_or(ServerError::NotFound)?;

    let is_last = screenshot.status != "not_obtained";
    Ok(raw(vec![json!({
        "result": {
            "screenshot_id": screenshot_id.to_string(),
            "base64_data": screenshot.image_base64,
            "suffix": screenshot.file_type,
            "status": screenshot.status,
        },
        "type": "retry_until_last",
        "is_last": is_last,
    })]))
}
