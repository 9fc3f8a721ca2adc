//! # vmctl-hypervisor: the Hypervisor Adapter contract
//!
//! The real hypervisor client (vSphere or otherwise) is an external
//! collaborator, explicitly out of scope to implement. This crate pins
//! down the trait boundary the Deploy Worker, Ops Worker and Host-Info
//! Obtainer are written against, plus [`mock::MockAdapter`] — a
//! deterministic in-memory implementation used by every test in
//! `vmctl-workers` and `vmctl-server`.
//!
//! Every operation is assumed idempotent by its callers: a worker that
//! crashes after calling `start` but before recording the result will
//! call `start` again on retry, and the adapter must tolerate that.

pub mod error;
pub mod mock;

use vmctl_types::{HostRuntimeInfo, Machine};

pub use error::{HypervisorError, Result};

/// Everything the worker loops need from the underlying virtualization
/// platform. One call per operation, synchronous — workers are
/// blocking-mode loops and have no use for async here.
pub trait HypervisorAdapter: Send + Sync {
    /// Creates a machine from a template/network/folder label set and
    /// returns the provider-assigned id (`nos_id` in [`Machine`]).
    /// `running_hint` tells the adapter to leave the clone powered on
    /// once deploy completes rather than its usual powered-off default.
    fn deploy(&self, machine: &Machine, template: &str, network: &str, running_hint: bool, folder: &str) -> Result<String>;

    /// Like [`Self::deploy`] but places the machine on the host bound
    /// to `ticket_host_moref`, as assigned by the Ticket Scheduler, and
    /// returns the produced managed-object reference alongside the
    /// provider id so the caller can bind the ticket to it.
    fn deploy_via_ticket(
        &self,
        machine: &Machine,
        template: &str,
        network: &str,
        running_hint: bool,
        folder: &str,
        ticket_host_moref: &str,
    ) -> Result<TicketedDeploy>;

    /// Reassigns a machine's network adapter.
    fn config_network(&self, provider_id: &str, network: &str) -> Result<()>;

    fn start(&self, provider_id: &str) -> Result<()>;
    fn stop(&self, provider_id: &str) -> Result<()>;
    fn reset(&self, provider_id: &str) -> Result<()>;

    /// Removes a machine from the hypervisor entirely.
    fn undeploy(&self, provider_id: &str) -> Result<()>;

    /// Refreshes power state, IP addresses and provider-side name for
    /// a machine. Returns `(power_state, ip_addresses, machine_name)`.
    fn get_machine_info(&self, provider_id: &str) -> Result<MachineInfo>;

    fn take_snapshot(&self, provider_id: &str, snapshot_name: &str) -> Result<()>;
    fn revert_snapshot(&self, provider_id: &str, snapshot_name: &str) -> Result<()>;
    fn remove_snapshot(&self, provider_id: &str, snapshot_name: &str) -> Result<()>;

    /// Returns a base64-encoded PNG of the machine's console.
    fn take_screenshot(&self, provider_id: &str) -> Result<String>;

    /// Lists every host under the given inventory folder, used by the
    /// Host-Info Obtainer to discover new hosts and by the Ticket
    /// Scheduler to discover new deploy slots.
    fn get_hosts_in_folder(&self, folder: &str) -> Result<Vec<HostRuntimeInfo>>;

    /// `true` once the adapter has nothing outstanding against the
    /// hypervisor — used by graceful shutdown to decide it is safe to
    /// stop polling.
    fn idle(&self) -> bool;
}

/// Power/network facts refreshed by [`HypervisorAdapter::get_machine_info`].
#[derive(Debug, Clone, Default)]
pub struct MachineInfo {
    pub power_state: PowerState,
    pub ip_addresses: Vec<String>,
    pub nos_id: String,
    pub machine_name: String,
    pub machine_search_link: String,
    pub mo_ref: String,
}

/// What a ticketed deploy produces: the provider id plus the
/// managed-object reference the caller binds its claimed
/// [`vmctl_types::DeployTicket`] to.
#[derive(Debug, Clone, Default)]
pub struct TicketedDeploy {
    pub uuid: String,
    pub mo_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    #[default]
    Unknown,
    PoweredOn,
    PoweredOff,
}
