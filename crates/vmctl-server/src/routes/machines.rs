//! `POST /machines`, `GET /machines[?state=…]`, `GET /machines/{id}`,
//! `DELETE /machines/{id}`, `PUT /machines/{id}`.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use vmctl_rbac::{PolicyEnforcer, Role};
use vmctl_store::async_adapter;
use vmctl_types::{Action, Document, Machine, MachineState, Request, RequestType};

use crate::auth::Caller;
use crate::envelope::{single, ResponseElement};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DeployBody {
    pub labels: Vec<String>,
}

/// Validates a deploy request's labels the same way the system this
/// was modeled on's `check_payload_deploy` does: exactly one
/// `template:` label, and that label must be a configured label or
/// match the configured skip-validation suffix.
fn validate_deploy_labels(labels: &[String], state: &AppState) -> ServerResult<()> {
    let template_labels: Vec<&String> = labels.iter().filter(|l| l.starts_with("template:")).collect();
    if template_labels.is_empty() {
        return Err(ServerError::InvalidUsage(format!(
            "label specification {labels:?} does not contain 'template' label"
        )));
    }
    if template_labels.len() > 1 {
        return Err(ServerError::InvalidUsage(format!(
            "label specification {labels:?} contains multiple 'template' labels"
        )));
    }
    let suffix = &state.settings.unit.skip_template_validation_for_suffix;
    for template_label in &template_labels {
        let supported = state.settings.unit.labels.iter().any(|l| l == *template_label);
        let skip_ok = !suffix.is_empty() && template_label.ends_with(suffix.as_str());
        if !supported && !skip_ok {
            return Err(ServerError::InvalidUsage(format!(
                "'{template_label}' label is not supported by this unit"
            )));
        }
    }
    Ok(())
}

pub async fn deploy(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<DeployBody>,
) -> ServerResult<Response> {
    validate_deploy_labels(&body.labels, &state)?;

    let snapshot = {
        let client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
        state.capabilities.fetch(&client, true).await?
    };
    if snapshot.free_slots < 1 {
        return Err(ServerError::NoFreeSlots);
    }

    let mut client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let tx = client.transaction().await.map_err(vmctl_store::StoreError::from)?;

    let mut new_request = async_adapter::insert(&tx, Request::new(RequestType::Deploy, "", "")).await?;

    let owner = if state.settings.http.personalised {
        caller.login.clone()
    } else {
        String::new()
    };
    let mut machine = Machine::new("default", owner);
    machine.labels = body.labels;
    machine.requests.push(new_request.id.unwrap_or_default().to_string());
    let machine = async_adapter::insert(&tx, machine).await?;

    new_request.machine = machine.id.unwrap_or_default().to_string();
    async_adapter::update(&tx, &new_request).await?;

    async_adapter::insert(&tx, Action::new("deploy", new_request.id.unwrap_or_default().to_string())).await?;

    tx.commit().await.map_err(vmctl_store::StoreError::from)?;

    Ok(single(ResponseElement::request_id(new_request.id.unwrap_or_default())))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub state: Option<MachineState>,
}

pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> ServerResult<Response> {
    let client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;

    let mut filters = Vec::new();
    if let Some(machine_state) = query.state {
        filters.push(("state".to_string(), json!(machine_state)));
    }
    if state.settings.http.personalised && !caller.is_admin() {
        filters.push(("owner".to_string(), json!(caller.login)));
    }

    let machines: Vec<Machine> = async_adapter::find(&*client, &filters).await?;
    let output: Vec<_> = machines.iter().map(|m| m.redacted_view(caller.is_admin())).collect();

    Ok(single(ResponseElement::return_value(json!(output), true)))
}

pub async fn get(State(state): State<AppState>, caller: Caller, Path(machine_id): Path<i64>) -> ServerResult<Response> {
    let client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let machine: Machine = async_adapter::get_by_id(&*client, machine_id)
        .await?
        .ok_or(ServerError::NotFound)?;
    if state.settings.http.personalised {
        PolicyEnforcer::new(caller.role, &caller.login).enforce_machine_access(&machine.owner)?;
    }
    Ok(single(ResponseElement::return_value(machine.redacted_view(caller.is_admin()), true)))
}

async fn load_owned_machine(state: &AppState, caller: &Caller, machine_id: i64, tx: &tokio_postgres::Transaction<'_>) -> ServerResult<Machine> {
    let machine: Machine = async_adapter::get_by_id(tx, machine_id).await?.ok_or(ServerError::NotFound)?;
    if state.settings.http.personalised && !caller.is_admin() {
        PolicyEnforcer::new(Role::User, &caller.login).enforce_machine_access(&machine.owner)?;
    }
    Ok(machine)
}

pub async fn delete(State(state): State<AppState>, caller: Caller, Path(machine_id): Path<i64>) -> ServerResult<Response> {
    let mut client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let tx = client.transaction().await.map_err(vmctl_store::StoreError::from)?;

    let mut machine = load_owned_machine(&state, &caller, machine_id, &tx).await?;

    let new_request = async_adapter::insert(&tx, Request::new(RequestType::Undeploy, machine_id.to_string(), "")).await?;
    machine.requests.push(new_request.id.unwrap_or_default().to_string());
    async_adapter::update(&tx, &machine).await?;
    async_adapter::insert(&tx, Action::new("other", new_request.id.unwrap_or_default().to_string())).await?;

    tx.commit().await.map_err(vmctl_store::StoreError::from)?;
    Ok(single(ResponseElement::request_id(new_request.id.unwrap_or_default())))
}

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub action: String,
}

pub async fn action(
    State(state): State<AppState>,
    caller: Caller,
    Path(machine_id): Path<i64>,
    Json(body): Json<ActionBody>,
) -> ServerResult<Response> {
    let request_type = match body.action.as_str() {
        "start" => RequestType::Start,
        "stop" => RequestType::Stop,
        "restart" => RequestType::Reset,
        other => {
            return Err(ServerError::InvalidUsage(format!(
                "malformed input json data, invalid or none 'action' specified: {other}"
            )))
        }
    };

    let mut client = state.pool.get().await.map_err(vmctl_store::StoreError::from)?;
    let tx = client.transaction().await.map_err(vmctl_store::StoreError::from)?;

    let mut machine = load_owned_machine(&state, &caller, machine_id, &tx).await?;
    if request_type == RequestType::Reset && machine.state != MachineState::Running {
        return Err(ServerError::InvalidUsage(format!(
            "Machine must be running to invoke 'reset', but was in state '{}'",
            machine.state
        )));
    }

    let new_request = async_adapter::insert(&tx, Request::new(request_type, machine_id.to_string(), "")).await?;
    machine.requests.push(new_request.id.unwrap_or_default().to_string());
    async_adapter::update(&tx, &machine).await?;
    async_adapter::insert(&tx, Action::new("other", new_request.id.unwrap_or_default().to_string())).await?;

    tx.commit().await.map_err(vmctl_store::StoreError::from)?;
    Ok(single(ResponseElement::request_id(new_request.id.unwrap_or_default())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_unit_labels(labels: &[&str], skip_suffix: &str) -> AppState {
        let mut settings = vmctl_config::Settings::load(None).unwrap();
        settings.unit.labels = labels.iter().map(ToString::to_string).collect();
        settings.unit.skip_template_validation_for_suffix = skip_suffix.to_string();
        AppState::new(deadpool_test_pool(), settings)
    }

    // A deadpool pool never gets `.get()` called on it in these tests,
    // so it never needs to connect anywhere; `builder` alone is enough
    // to produce a value of the right type.
    fn deadpool_test_pool() -> vmctl_store::conn::AsyncPool {
        deadpool_postgres::Config::new()
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
            .unwrap()
    }

    #[test]
    fn rejects_missing_template_label() {
        let state = state_with_unit_labels(&["template:base"], "");
        let err = validate_deploy_labels(&["env:prod".to_string()], &state).unwrap_err();
        assert!(matches!(err, ServerError::InvalidUsage(_)));
    }

    #[test]
    fn rejects_more_than_one_template_label() {
        let state = state_with_unit_labels(&["template:base"], "");
        let labels = vec!["template:base".to_string(), "template:other".to_string()];
        assert!(validate_deploy_labels(&labels, &state).is_err());
    }

    #[test]
    fn accepts_a_configured_template_label() {
        let state = state_with_unit_labels(&["template:base"], "");
        assert!(validate_deploy_labels(&["template:base".to_string()], &state).is_ok());
    }

    #[test]
    fn rejects_an_unconfigured_template_label_without_skip_suffix() {
        let state = state_with_unit_labels(&["template:base"], "");
        assert!(validate_deploy_labels(&["template:adhoc".to_string()], &state).is_err());
    }

    #[test]
    fn skip_suffix_allows_an_otherwise_unconfigured_template() {
        let state = state_with_unit_labels(&["template:base"], "-adhoc");
        assert!(validate_deploy_labels(&["template:foo-adhoc".to_string()], &state).is_ok());
    }
}
