//! `GET /requests/{id}`: translates a [`Request`]'s persisted state
//! into the polling contract callers drive until `is_last=true`.

use axum::extract::{Path, State};
use axum::response::Response;
use serde_json::json;

use vmctl_store::async_adapter;
use vmctl_types::{Request, RequestType, Snapshot};

use crate::envelope::raw;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub async fn get(State(state): State<AppState>, Path(request_id): Path<i64>) -> ServerResult<Response> {
    let client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;

    let req: Request = async_adapter::get_by_id(&*client, request_id)
        .await?
        .ok_or(ServerError::NotFound)?;

    let mut result = json!({
        "machine_id": req.machine,
        "state": req.state,
        "request_type": req.kind,
        "modified_at": req.modified_at,
    });

    if req.kind == RequestType::TakeSnapshot {
        if let Ok(subject_id) = req.subject_id.parse::<i64>() {
            if let Some(snapshot) = async_adapter::get_by_id::<_, Snapshot>(&*client, subject_id).await? {
                result["id"] = json!(snapshot.id);
                result["name"] = json!(snapshot.name);
            }
        }
    }

    let mut elements = vec![json!({
        "result": result,
        "is_last": req.state.has_finished(),
        "type": "return_value",
    })];

    if req.kind == RequestType::Deploy {
        let snapshot = state.capabilities.fetch(&client, true).await?;
        elements.insert(
            0,
            json!({
                "result": {
                    "machine_id": req.machine,
                    "capabilities": snapshot.to_json(),
                },
                "is_last": false,
                "type": "return_value",
            }),
        );
    }

    if req.state.is_error() {
        let unit_name = &state.settings.unit.name;
        let message = if req.kind == RequestType::Deploy {
            format!("deploy of machine '{}' on unit '{unit_name}' failed", req.machine)
        } else {
            format!("request {request_id} ({}) failed, machine_id: {}", req.kind, req.machine)
        };
        let last_idx = elements.len() - 1;
        elements[last_idx]["is_last"] = json!(false);
        elements.push(json!({
            "exception": message,
            "exception_args": [],
            "exception_traceback": [],
            "is_last": true,
        }));
    }

    Ok(raw(elements))
}
