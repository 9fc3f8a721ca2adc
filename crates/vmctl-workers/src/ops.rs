//! The Ops Worker: everything that isn't `deploy` — start, stop,
//! reset, undeploy, snapshot and screenshot operations, plus the
//! periodic `get_info` refresh.

use rand::Rng;
use tracing::{info, warn};
use vmctl_hypervisor::HypervisorAdapter;
use vmctl_store::adapter;
use vmctl_types::{
    Action, ActionLock, Machine, MachineState, Request, RequestState, RequestType, Screenshot,
    Snapshot,
};

use crate::error::{Result, WorkerError};
use crate::tickets;

/// Default number of times `get_info` retries before giving up.
const GET_INFO_REPETITIONS: i32 = 3;

/// Dispatches `action` to the handler for its request's [`RequestType`],
/// then always marks the action finished — ops actions, like deploy
/// actions, run to completion in one shot; only `get_info` re-arms
/// itself by leaving `lock = Sleeping` instead of `Finished`.
///
/// A handler failure is committed as `Request.state = Failed` plus the
/// action finish in the same transaction the error happened in, then
/// this returns `Ok(())` — the failure is the recorded outcome, not a
/// reason to roll the transaction back and lose it. Only a failure to
/// *write* that outcome propagates.
///
/// # Errors
///
/// Returns the underlying store error if the request/machine/action
/// themselves can't be read or updated.
pub fn process_ops_action(
    tx: &mut postgres::Transaction<'_>,
    action: &mut Action,
    hv: &dyn HypervisorAdapter,
) -> Result<()> {
    let request_id: i64 = action.request.parse().unwrap_or_default();
    let mut request: Request = adapter::get_by_id(tx, request_id)?
        .ok_or_else(|| WorkerError::MissingSubjectId(action.request.clone()))?;
    let machine_id: i64 = request.machine.parse().unwrap_or_default();
    let mut machine: Machine = adapter::get_by_id(tx, machine_id)?
        .ok_or_else(|| WorkerError::MissingSubjectId(request.machine.clone()))?;

    info!(machine_id, kind = %request.kind, "processing ops action");

    let result = dispatch(tx, action, &mut request, &mut machine, hv);

    if let Err(err) = &result {
        warn!(machine_id, %err, "ops action failed");
        request.state = RequestState::Failed;
        adapter::update(tx, &request)?;
        action.lock = ActionLock::Finished.into();
        adapter::update(tx, action)?;
        return Ok(());
    }

    if action.kind != RequestType::GetInfo.to_string() {
        action.lock = ActionLock::Finished.into();
    }
    adapter::update(tx, action)?;

    Ok(())
}

fn dispatch(
    tx: &mut postgres::Transaction<'_>,
    action: &mut Action,
    request: &mut Request,
    machine: &mut Machine,
    hv: &dyn HypervisorAdapter,
) -> Result<()> {
    if !machine.state.can_be_changed() && request.kind != RequestType::Undeploy {
        return Err(WorkerError::UndeployedMachine(machine_id_of(machine)));
    }

    let releases_ticket = matches!(request.kind, RequestType::Undeploy | RequestType::Stop);

    let result = match request.kind {
        RequestType::Undeploy => action_undeploy(request, machine, hv),
        RequestType::Start => action_start(request, machine, hv),
        RequestType::Stop => action_stop(request, machine, hv),
        RequestType::Reset => action_reset(request, machine, hv),
        RequestType::GetInfo => action_get_info(tx, action, request, machine, hv),
        RequestType::TakeScreenshot => action_take_screenshot(tx, request, machine, hv),
        RequestType::TakeSnapshot => action_take_snapshot(tx, request, machine, hv),
        RequestType::RestoreSnapshot => action_restore_snapshot(tx, request, machine, hv),
        RequestType::DeleteSnapshot => action_delete_snapshot(tx, request, machine, hv),
        RequestType::Deploy => Err(WorkerError::UnhandledRequestType(request.kind.to_string())),
    };

    // Undeploy/stop release the deploy ticket bound to the VM, if any,
    // back to the pool: spec requires `taken=0, assigned_vm_moref=""`
    // once the VM it was holding a slot for is gone or powered down.
    if result.is_ok() && releases_ticket {
        tickets::release_by_vm_moref(tx, &machine.machine_moref)?;
        machine.machine_moref = String::new();
    }

    result
}

fn set_machine_state_if_allowed(request: &Request, machine: &mut Machine, state: MachineState) {
    if request.kind.can_change_machine_state() {
        machine.state = state;
    }
}

fn action_undeploy(request: &mut Request, machine: &mut Machine, hv: &dyn HypervisorAdapter) -> Result<()> {
    hv.undeploy(&machine.provider_id)?;
    set_machine_state_if_allowed(request, machine, MachineState::Undeployed);
    request.state = RequestState::Success;
    Ok(())
}

fn action_start(request: &mut Request, machine: &mut Machine, hv: &dyn HypervisorAdapter) -> Result<()> {
    hv.start(&machine.provider_id)?;
    set_machine_state_if_allowed(request, machine, MachineState::Running);
    request.state = RequestState::Success;
    Ok(())
}

fn action_stop(request: &mut Request, machine: &mut Machine, hv: &dyn HypervisorAdapter) -> Result<()> {
    hv.stop(&machine.provider_id)?;
    set_machine_state_if_allowed(request, machine, MachineState::Stopped);
    request.state = RequestState::Success;
    Ok(())
}

fn action_reset(request: &mut Request, machine: &mut Machine, hv: &dyn HypervisorAdapter) -> Result<()> {
    hv.reset(&machine.provider_id)?;
    set_machine_state_if_allowed(request, machine, MachineState::Running);
    request.state = RequestState::Success;
    Ok(())
}

/// Refreshes `machine`'s power state and IP addresses. Re-arms itself
/// with a jittered `next_try` up to `repetitions - 1` times so the
/// machine's network details get a few chances to show up after boot;
/// once `repetitions` hits zero the Delayed Reaper (not this function)
/// will time the request out.
fn action_get_info(
    tx: &mut postgres::Transaction<'_>,
    action: &mut Action,
    request: &mut Request,
    machine: &mut Machine,
    hv: &dyn HypervisorAdapter,
) -> Result<()> {
    let info = hv.get_machine_info(&machine.provider_id)?;
    machine.ip_addresses = info.ip_addresses;
    machine.machine_name = info.machine_name;
    let is_running = info.power_state == vmctl_hypervisor::PowerState::PoweredOn;
    set_machine_state_if_allowed(
        request,
        machine,
        if is_running { MachineState::Running } else { MachineState::Deployed },
    );
    adapter::update(tx, machine)?;

    let have_ip = !machine.ip_addresses.is_empty();
    if have_ip || action.repetitions <= 0 {
        action.lock = ActionLock::Finished.into();
        request.state = RequestState::Success;
    } else {
        action.repetitions -= 1;
        let jitter = rand::thread_rng().gen_range(action.delay..=action.delay + 3);
        action.next_try = chrono::Utc::now() + chrono::Duration::seconds(i64::from(jitter));
        action.lock = ActionLock::Sleeping.into();
    }
    Ok(())
}

fn action_take_screenshot(
    tx: &mut postgres::Transaction<'_>,
    request: &mut Request,
    machine: &mut Machine,
    hv: &dyn HypervisorAdapter,
) -> Result<()> {
    let image = hv.take_screenshot(&machine.provider_id)?;
    let mut screenshot = Screenshot::new(machine.id.unwrap_or_default().to_string());
    screenshot.image_base64 = image;
    screenshot.status = "obtained".to_string();
    let screenshot = adapter::insert(tx, screenshot)?;
    machine.screenshots.push(screenshot.id.unwrap_or_default().to_string());
    adapter::update(tx, machine)?;
    request.state = RequestState::Success;
    Ok(())
}

fn action_take_snapshot(
    tx: &mut postgres::Transaction<'_>,
    request: &mut Request,
    machine: &mut Machine,
    hv: &dyn HypervisorAdapter,
) -> Result<()> {
    let mut snapshot = Snapshot::new(request.subject_id.clone(), machine.id.unwrap_or_default().to_string());
    let unique_name = snapshot.unique_name();
    hv.take_snapshot(&machine.provider_id, &unique_name)?;
    snapshot.status = "created".to_string();
    let snapshot = adapter::insert(tx, snapshot)?;
    machine.snapshots.push(snapshot.id.unwrap_or_default().to_string());
    adapter::update(tx, machine)?;
    request.state = RequestState::Success;
    Ok(())
}

fn action_restore_snapshot(
    tx: &mut postgres::Transaction<'_>,
    request: &mut Request,
    machine: &Machine,
    hv: &dyn HypervisorAdapter,
) -> Result<()> {
    let snapshot_id: i64 = request.subject_id.parse().map_err(|_| {
        WorkerError::MissingSubjectId(request.subject_id.clone())
    })?;
    let snapshot: Snapshot = adapter::get_by_id(tx, snapshot_id)?
        .ok_or_else(|| WorkerError::MissingSubjectId(request.subject_id.clone()))?;
    hv.revert_snapshot(&machine.provider_id, &snapshot.unique_name())?;
    request.state = RequestState::Success;
    Ok(())
}

fn action_delete_snapshot(
    tx: &mut postgres::Transaction<'_>,
    request: &mut Request,
    machine: &mut Machine,
    hv: &dyn HypervisorAdapter,
) -> Result<()> {
    let snapshot_id: i64 = request.subject_id.parse().map_err(|_| {
        WorkerError::MissingSubjectId(request.subject_id.clone())
    })?;
    let snapshot: Snapshot = adapter::get_by_id(tx, snapshot_id)?
        .ok_or_else(|| WorkerError::MissingSubjectId(request.subject_id.clone()))?;
    hv.remove_snapshot(&machine.provider_id, &snapshot.unique_name())?;
    adapter::delete::<_, Snapshot>(tx, snapshot_id)?;
    machine.snapshots.retain(|id| id.parse::<i64>() != Ok(snapshot_id));
    adapter::update(tx, machine)?;
    request.state = RequestState::Success;
    Ok(())
}

/// Queues a follow-up `get_info` request+action right after a
/// successful deploy or power-state change, the way the deploy flow
/// does to pick up the freshly assigned IP address once it appears.
///
/// # Errors
///
/// Returns the underlying store error.
pub fn enqueue_get_info_request(
    tx: &mut postgres::Transaction<'_>,
    machine: &mut Machine,
) -> Result<()> {
    let machine_id = machine.id.unwrap_or_default();
    let request = Request::new(RequestType::GetInfo, machine_id.to_string(), String::new());
    let request = adapter::insert(tx, request)?;

    let mut action = Action::new(RequestType::GetInfo.to_string(), request.id.unwrap_or_default().to_string());
    action.repetitions = GET_INFO_REPETITIONS;
    let action = adapter::insert(tx, action)?;

    machine.requests.push(request.id.unwrap_or_default().to_string());
    let _ = action;
    adapter::update(tx, machine)?;
    Ok(())
}

fn machine_id_of(machine: &Machine) -> String {
    machine.id.unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmctl_hypervisor::mock::MockAdapter;

    #[test]
    fn undeploy_allowed_even_when_machine_cannot_change() {
        let hv = MockAdapter::new();
        let mut machine = Machine::new("default", "alice");
        machine.state = MachineState::Failed;
        let provider_id = hv.deploy(&machine, "tmpl", "", true, "").unwrap();
        machine.provider_id = provider_id;

        let mut request = Request::new(RequestType::Undeploy, "1", String::new());
        let result = action_undeploy(&mut request, &mut machine, &hv);
        assert!(result.is_ok());
        assert_eq!(machine.state, MachineState::Undeployed);
    }

    #[test]
    fn start_sets_running_state() {
        let hv = MockAdapter::new();
        let mut machine = Machine::new("default", "alice");
        let provider_id = hv.deploy(&machine, "tmpl", "", true, "").unwrap();
        machine.provider_id = provider_id;
        hv.stop(&machine.provider_id).unwrap();

        let mut request = Request::new(RequestType::Start, "1", String::new());
        action_start(&mut request, &mut machine, &hv).unwrap();
        assert_eq!(machine.state, MachineState::Running);
        assert_eq!(request.state, RequestState::Success);
    }
}
