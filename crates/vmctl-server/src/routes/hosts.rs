//! `GET /hosts`, `GET /hosts/{id}`, `PUT /hosts/{id}`.

use axum::extract::{Path, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

use vmctl_store::async_adapter;
use vmctl_types::{Document, HostRuntimeInfo};

use crate::envelope::{single, ResponseElement};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> ServerResult<Response> {
    let client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let hosts: Vec<HostRuntimeInfo> = async_adapter::find(&*client, &[]).await?;
    let output: Vec<_> = hosts.iter().map(|h| h.redacted_view(false)).collect();
    Ok(single(ResponseElement::return_value(json!({ "hosts": output }), true)))
}

pub async fn get(State(state): State<AppState>, Path(host_id): Path<i64>) -> ServerResult<Response> {
    let client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let host: HostRuntimeInfo = async_adapter::get_by_id(&*client, host_id).await?.ok_or(ServerError::NotFound)?;
    Ok(single(ResponseElement::return_value(host.redacted_view(false), true)))
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceBody {
    pub action: String,
}

pub async fn put(
    State(state): State<AppState>,
    Path(host_id): Path<i64>,
    axum::Json(body): axum::Json<MaintenanceBody>,
) -> ServerResult<Response> {
    let to_be_in_maintenance = match body.action.as_str() {
        "enter_maintenance" => true,
        "leave_maintenance" => false,
        other => {
            return Err(ServerError::InvalidUsage(format!(
                "malformed input json data, invalid or none 'action' specified: {other}"
            )))
        }
    };

    let mut client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let tx = client.transaction().await.map_err(vmctl_store::StoreError::from)?;

    let mut host: HostRuntimeInfo = async_adapter::get_by_id(&tx, host_id).await?.ok_or(ServerError::NotFound)?;
    host.to_be_in_maintenance = to_be_in_maintenance;
    async_adapter::update(&tx, &host).await?;

    tx.commit().await.map_err(vmctl_store::StoreError::from)?;

    Ok(single(ResponseElement::return_value(json!({}), true)))
}
