//! The Deploy Worker: turns a `deploy` [`Action`] into a running
//! machine on the hypervisor.

use tracing::{info, warn};
use vmctl_hypervisor::HypervisorAdapter;
use vmctl_store::adapter;
use vmctl_types::{Action, ActionLock, Machine, MachineState, Request, RequestState, RequestType};

use crate::error::{Result, WorkerError};
use crate::labels;
use crate::ops::enqueue_get_info_request;
use crate::tickets;

/// Deploys the machine a `deploy` action's request targets, claims a
/// [`vmctl_types::DeployTicket`] first when `ticket_host_moref` is
/// supplied (host-slotted placement), and always finishes the action
/// (`lock = Finished`) whether the deploy succeeded or failed — a
/// deploy action never retries, it just marks the request's outcome.
///
/// A failed deploy is not an error this function propagates: once the
/// request and machine are durably marked `Failed` and the action is
/// finished, those writes must survive the surrounding transaction, so
/// this returns `Ok(())`. Only a failure to *write* that failure state
/// — a genuine store error — propagates, since then nothing was
/// actually recorded and the whole attempt should roll back and retry.
///
/// # Errors
///
/// Returns the underlying store error if the request/machine/action
/// themselves can't be read or updated.
pub fn process_deploy_action(
    tx: &mut postgres::Transaction<'_>,
    action: &mut Action,
    hv: &dyn HypervisorAdapter,
    ticket_host_moref: Option<&str>,
) -> Result<()> {
    try_deploy(tx, action, hv, ticket_host_moref)
}

fn try_deploy(
    tx: &mut postgres::Transaction<'_>,
    action: &mut Action,
    hv: &dyn HypervisorAdapter,
    ticket_host_moref: Option<&str>,
) -> Result<()> {
    let request_id: i64 = action.request.parse().unwrap_or_default();
    let mut request: Request = adapter::get_by_id(tx, request_id)?
        .ok_or_else(|| WorkerError::UndeployedMachine(action.request.clone()))?;
    let machine_id: i64 = request.machine.parse().unwrap_or_default();
    let mut machine: Machine = adapter::get_by_id(tx, machine_id)?
        .ok_or_else(|| WorkerError::UndeployedMachine(request.machine.clone()))?;

    info!(machine_id, state = %machine.state, "deploying");

    if machine.state == MachineState::Undeployed {
        warn!(machine_id, "attempted to deploy an undeployed machine");
        return fail_deploy(tx, action, &mut request, &mut machine);
    }

    let template = match labels::template(&machine.labels) {
        Ok(template) => template,
        Err(err) => {
            warn!(machine_id, %err, "machine has no deployable template label");
            return fail_deploy(tx, action, &mut request, &mut machine);
        }
    };
    let network = labels::network_interface(&machine.labels).unwrap_or_default();
    let folder = labels::inventory_folder(&machine.labels).unwrap_or_default();
    let running_hint = labels::has_running_label(&machine.labels);

    let (provider_id, bound_ticket_mo_ref) = match ticket_host_moref {
        Some(host) => match hv.deploy_via_ticket(&machine, &template, &network, running_hint, &folder, host) {
            Ok(deployed) if deployed.uuid.is_empty() => {
                warn!(machine_id, "hypervisor returned an empty provider id");
                tickets::release_by_host(tx, host)?;
                return fail_deploy(tx, action, &mut request, &mut machine);
            }
            Ok(deployed) => {
                tickets::bind(tx, host, &deployed.mo_ref)?;
                (deployed.uuid, Some(deployed.mo_ref))
            }
            Err(err) => {
                warn!(machine_id, %err, "ticketed hypervisor deploy failed");
                tickets::release_by_host(tx, host)?;
                return fail_deploy(tx, action, &mut request, &mut machine);
            }
        },
        None => match hv.deploy(&machine, &template, &network, running_hint, &folder) {
            Ok(id) if id.is_empty() => {
                warn!(machine_id, "hypervisor returned an empty provider id");
                return fail_deploy(tx, action, &mut request, &mut machine);
            }
            Ok(id) => (id, None),
            Err(err) => {
                warn!(machine_id, %err, "hypervisor deploy failed");
                return fail_deploy(tx, action, &mut request, &mut machine);
            }
        },
    };

    if !network.is_empty() {
        if let Err(err) = hv.config_network(&provider_id, &network) {
            warn!(machine_id, %err, "failed to configure network after deploy");
            let _ = hv.undeploy(&provider_id);
            if let Some(host) = ticket_host_moref {
                tickets::release_by_host(tx, host)?;
            }
            return fail_deploy(tx, action, &mut request, &mut machine);
        }
    }

    let info = match hv.get_machine_info(&provider_id) {
        Ok(info) => info,
        Err(err) => {
            warn!(machine_id, %err, "failed to read machine info after deploy");
            let _ = hv.stop(&provider_id);
            let _ = hv.undeploy(&provider_id);
            if let Some(host) = ticket_host_moref {
                tickets::release_by_host(tx, host)?;
            }
            return fail_deploy(tx, action, &mut request, &mut machine);
        }
    };

    // A deployed machine without a nos_id is non-operational; this is a
    // hard rule, not a retryable condition.
    if info.nos_id.is_empty() {
        warn!(machine_id, "hypervisor deploy produced no nos_id");
        let _ = hv.stop(&provider_id);
        let _ = hv.undeploy(&provider_id);
        if let Some(host) = ticket_host_moref {
            tickets::release_by_host(tx, host)?;
        }
        return fail_deploy(tx, action, &mut request, &mut machine);
    }

    machine.provider_id = provider_id;
    machine.machine_moref = bound_ticket_mo_ref.unwrap_or_else(|| info.mo_ref.clone());
    machine.nos_id = info.nos_id;
    machine.machine_name = info.machine_name;
    machine.machine_search_link = info.machine_search_link;
    machine.ip_addresses = info.ip_addresses;
    let is_running = info.power_state == vmctl_hypervisor::PowerState::PoweredOn;
    machine.state = if is_running { MachineState::Running } else { MachineState::Deployed };
    adapter::update(tx, &machine)?;

    request.state = RequestState::Success;
    adapter::update(tx, &request)?;

    action.lock = ActionLock::Finished.into();
    adapter::update(tx, action)?;

    if is_running {
        enqueue_get_info_request(tx, &mut machine)?;
    }

    Ok(())
}

/// Commits the deploy's failure outcome: `Request.state = Failed`,
/// `Machine.state = Failed`, `Action.lock = Finished`. Called from
/// every failure branch of [`try_deploy`] so those writes land in the
/// same transaction the triggering error would otherwise have rolled
/// back.
fn fail_deploy(
    tx: &mut postgres::Transaction<'_>,
    action: &mut Action,
    request: &mut Request,
    machine: &mut Machine,
) -> Result<()> {
    request.state = RequestState::Failed;
    adapter::update(tx, request)?;
    machine.state = MachineState::Failed;
    adapter::update(tx, machine)?;
    action.lock = ActionLock::Finished.into();
    adapter::update(tx, action)?;
    Ok(())
}

/// `true` if `request_type` is the kind the Deploy Worker (as opposed
/// to the Ops Worker) processes.
#[must_use]
pub fn is_deploy_request(request_type: RequestType) -> bool {
    request_type == RequestType::Deploy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_deploy_requests_belong_to_the_deploy_worker() {
        assert!(is_deploy_request(RequestType::Deploy));
        assert!(!is_deploy_request(RequestType::Undeploy));
        assert!(!is_deploy_request(RequestType::Start));
        assert!(!is_deploy_request(RequestType::Stop));
        assert!(!is_deploy_request(RequestType::Reset));
        assert!(!is_deploy_request(RequestType::GetInfo));
    }
}
