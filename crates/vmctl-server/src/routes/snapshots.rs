//! `POST /machines/{id}/snapshots`, `PUT .../{sid}`, `DELETE .../{sid}`.

use axum::extract::{Path, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

use vmctl_store::async_adapter;
use vmctl_types::{Action, Machine, Request, RequestType, Snapshot};

use crate::envelope::raw;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TakeSnapshotBody {
    pub name: String,
}

pub async fn take(
    State(state): State<AppState>,
    Path(machine_id): Path<i64>,
    axum::Json(body): axum::Json<TakeSnapshotBody>,
) -> ServerResult<Response> {
    let mut client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let tx = client.transaction().await.map_err(vmctl_store::StoreError::from)?;

    let snapshot = async_adapter::insert(&tx, Snapshot::new(body.name, machine_id.to_string())).await?;
    let new_request = async_adapter::insert(
        &tx,
        Request::new(RequestType::TakeSnapshot, machine_id.to_string(), snapshot.id.unwrap_or_default().to_string()),
    )
    .await?;
    async_adapter::insert(&tx, Action::new("other", new_request.id.unwrap_or_default().to_string())).await?;

    tx.commit().await.map_err(vmctl_store::StoreError::from)?;

    Ok(raw(vec![json!({
        "type": "request_id",
        "request_id": new_request.id.unwrap_or_default().to_string(),
        "snapshot_id": snapshot.id.unwrap_or_default().to_string(),
        "is_last": true,
    })]))
}

#[derive(Debug, Deserialize)]
pub struct RestoreBody {
    pub action: String,
}

pub async fn restore(
    State(state): State<AppState>,
    Path((machine_id, snapshot_id)): Path<(i64, i64)>,
    axum::Json(body): axum::Json<RestoreBody>,
) -> ServerResult<Response> {
    if body.action != "restore" {
        return Err(ServerError::InvalidUsage(format!("Invalid 'action' value: {}", body.action)));
    }

    let mut client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let tx = client.transaction().await.map_err(vmctl_store::StoreError::from)?;

    let machine: Machine = async_adapter::get_by_id(&tx, machine_id).await?.ok_or(ServerError::NotFound)?;
    if !machine.snapshots.iter().any(|s| s == &snapshot_id.to_string()) {
        return Err(ServerError::InvalidUsage(format!(
            "Machine '{machine_id}' does not have snapshot '{snapshot_id}'"
        )));
    }

    let new_request = async_adapter::insert(
        &tx,
        Request::new(RequestType::RestoreSnapshot, machine_id.to_string(), snapshot_id.to_string()),
    )
    .await?;
    async_adapter::insert(&tx, Action::new("other", new_request.id.unwrap_or_default().to_string())).await?;

    tx.commit().await.map_err(vmctl_store::StoreError::from)?;

    Ok(raw(vec![json!({
        "type": "request_id",
        "request_id": new_request.id.unwrap_or_default().to_string(),
        "is_last": true,
    })]))
}

pub async fn delete(State(state): State<AppState>, Path((machine_id, snapshot_id)): Path<(i64, i64)>) -> ServerResult<Response> {
    let mut client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let tx = client.transaction().await.map_err(vmctl_store::StoreError::from)?;

    let machine: Machine = async_adapter::get_by_id(&tx, machine_id).await?.ok_or(ServerError::NotFound)?;
    if !machine.snapshots.iter().any(|s| s == &snapshot_id.to_string()) {
        return Err(ServerError::InvalidUsage(format!(
            "Machine '{machine_id}' does not have snapshot '{snapshot_id}'"
        )));
    }

    let new_request = async_adapter::insert(
        &tx,
        Request::new(RequestType::DeleteSnapshot, machine_id.to_string(), snapshot_id.to_string()),
    )
    .await?;
    async_adapter::insert(&tx, Action::new("other", new_request.id.unwrap_or_default().to_string())).await?;

    tx.commit().await.map_err(vmctl_store::StoreError::from)?;

    Ok(raw(vec![json!({
        "type": "request_id",
        "request_id": new_request.id.unwrap_or_default().to_string(),
        "is_last": true,
    })]))
}
