//! Concrete entities persisted in the `documents` table.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::document::{truncate_field, Document};
use crate::enums::{HostConnectionState, HostStandbyMode, MachineState, RequestState, RequestType};
use crate::{timestamp_not_initialized, Timestamp};

/// Maximum length of a screenshot's base64 body kept in a redacted view;
/// full images are still written to storage, this only bounds what a
/// list/GET response inlines.
const SCREENSHOT_PREVIEW_BYTES: usize = 256;

/// A durably queued unit of work a caller asked the system to perform
/// against a [`Machine`], e.g. `deploy` or `take_snapshot`. One
/// `Request` fans out into one or more [`Action`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub modified_at: Timestamp,
    #[serde(rename = "type")]
    pub kind: RequestType,
    pub state: RequestState,
    pub machine: String,
    pub subject_id: String,
}

impl Request {
    #[must_use]
    pub fn new(kind: RequestType, machine: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            id: None,
            modified_at: chrono::Utc::now(),
            kind,
            state: RequestState::Created,
            machine: machine.into(),
            subject_id: subject_id.into(),
        }
    }
}

impl Document for Request {
    fn type_name() -> &'static str {
        "request"
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn redacted_view(&self, _show_hidden: bool) -> Value {
        json!({
            "id": self.id,
            "modified_at": self.modified_at,
            "type": self.kind,
            "state": self.state,
            "machine": self.machine,
            "subject_id": self.subject_id,
        })
    }
}

/// Three-state lock used by [`Action`] and [`DeployTicket`] claim
/// queries: `Free` rows are eligible to be claimed, `Sleeping` rows are
/// owned by a worker, `Finished` rows are terminal and only the Delayed
/// Reaper (for actions) or cleanup passes (for tickets) ever look at
/// them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ActionLock {
    Free = 0,
    Sleeping = 1,
    Finished = -1,
}

impl From<ActionLock> for i32 {
    fn from(lock: ActionLock) -> Self {
        lock as i32
    }
}

/// One step of work a worker performs, belonging to exactly one
/// [`Request`]. Actions with `next_try` in the future are skipped by
/// claim queries until the Delayed Reaper frees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub modified_at: Timestamp,
    #[serde(rename = "type")]
    pub kind: String,
    pub request: String,
    pub lock: i32,
    pub repetitions: i32,
    pub delay: i32,
    pub next_try: Timestamp,
}

impl Action {
    #[must_use]
    pub fn new(kind: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            id: None,
            modified_at: chrono::Utc::now(),
            kind: kind.into(),
            request: request.into(),
            lock: ActionLock::Free.into(),
            repetitions: 0,
            delay: 5,
            next_try: timestamp_not_initialized(),
        }
    }
}

impl Document for Action {
    fn type_name() -> &'static str {
        "action"
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn lock_field(&self) -> Option<i32> {
        Some(self.lock)
    }

    fn redacted_view(&self, _show_hidden: bool) -> Value {
        json!({
            "id": self.id,
            "modified_at": self.modified_at,
            "type": self.kind,
            "request": self.request,
            "lock": self.lock,
            "repetitions": self.repetitions,
            "delay": self.delay,
            "next_try": self.next_try,
        })
    }
}

/// A managed virtual machine. The central inventory record the whole
/// system exists to keep in sync with the hypervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub unit: String,
    pub modified_at: Timestamp,
    pub created_at: Timestamp,
    pub labels: Vec<String>,
    pub custom_machine_name: String,
    pub state: MachineState,
    pub provider_id: String,
    /// Hypervisor managed-object reference, bound once the VM this
    /// machine deployed to is known; a [`DeployTicket`]'s
    /// `assigned_vm_moref` links back to this value.
    pub machine_moref: String,
    pub requests: Vec<String>,
    pub ip_addresses: Vec<String>,
    pub nos_id: String,
    pub machine_name: String,
    pub machine_search_link: String,
    pub screenshots: Vec<String>,
    pub snapshots: Vec<String>,
    /// Owner login. Hidden from non-admin callers by [`Self::redacted_view`].
    pub owner: String,
}

impl Machine {
    #[must_use]
    pub fn new(unit_name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: None,
            unit: unit_name.into(),
            modified_at: chrono::Utc::now(),
            created_at: chrono::Utc::now(),
            labels: Vec::new(),
            custom_machine_name: String::new(),
            state: MachineState::Created,
            provider_id: String::new(),
            machine_moref: String::new(),
            requests: Vec::new(),
            ip_addresses: Vec::new(),
            nos_id: String::new(),
            machine_name: String::new(),
            machine_search_link: String::new(),
            screenshots: Vec::new(),
            snapshots: Vec::new(),
            owner: owner.into(),
        }
    }
}

impl Document for Machine {
    fn type_name() -> &'static str {
        "machine"
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn redacted_view(&self, show_hidden: bool) -> Value {
        let mut view = json!({
            "id": self.id,
            "unit": self.unit,
            "modified_at": self.modified_at,
            "created_at": self.created_at,
            "labels": self.labels,
            "custom_machine_name": self.custom_machine_name,
            "state": self.state,
            "provider_id": self.provider_id,
            "machine_moref": self.machine_moref,
            "requests": self.requests,
            "ip_addresses": self.ip_addresses,
            "nos_id": self.nos_id,
            "machine_name": self.machine_name,
            "machine_search_link": self.machine_search_link,
            "screenshots": self.screenshots,
            "snapshots": self.snapshots,
        });
        if show_hidden {
            view["owner"] = json!(self.owner);
        }
        view
    }
}

/// A per-host deployment slot issued by the Ticket Scheduler. Deploy
/// Workers claim a free ticket before calling into the hypervisor so
/// that concurrent deploys stay balanced across hosts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployTicket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub modified_at: Timestamp,
    pub created_at: Timestamp,
    pub taken: i32,
    pub host_moref: String,
    pub enabled: bool,
    pub assigned_vm_moref: String,
}

impl DeployTicket {
    #[must_use]
    pub fn new(host_moref: impl Into<String>) -> Self {
        Self {
            id: None,
            modified_at: chrono::Utc::now(),
            created_at: timestamp_not_initialized(),
            taken: ActionLock::Free.into(),
            host_moref: host_moref.into(),
            enabled: false,
            assigned_vm_moref: String::new(),
        }
    }

    /// A SEPARATOR ticket marks a generation boundary for the Ticket
    /// Scheduler's rebalance algorithm; it is never claimed or deployed
    /// against, it just partitions the FIFO ticket order.
    #[must_use]
    pub fn new_separator() -> Self {
        Self {
            id: None,
            modified_at: chrono::Utc::now(),
            created_at: timestamp_not_initialized(),
            taken: ActionLock::Finished.into(),
            host_moref: "SEPARATOR".to_string(),
            enabled: false,
            assigned_vm_moref: String::new(),
        }
    }

    #[must_use]
    pub fn is_separator(&self) -> bool {
        self.host_moref == "SEPARATOR"
    }
}

impl Document for DeployTicket {
    fn type_name() -> &'static str {
        "deploy_ticket"
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn lock_field(&self) -> Option<i32> {
        Some(self.taken)
    }

    fn redacted_view(&self, _show_hidden: bool) -> Value {
        json!({
            "id": self.id,
            "modified_at": self.modified_at,
            "created_at": self.created_at,
            "taken": self.taken,
            "host_moref": self.host_moref,
            "enabled": self.enabled,
            "assigned_vm_moref": self.assigned_vm_moref,
        })
    }
}

/// Latest known runtime facts about a hypervisor host, refreshed
/// periodically by the Host-Info Obtainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRuntimeInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub modified_at: Timestamp,
    pub created_at: Timestamp,
    pub name: String,
    pub mo_ref: String,
    pub maintenance: bool,
    pub to_be_in_maintenance: bool,
    pub connection_state: HostConnectionState,
    pub vms_count: i32,
    pub vms_running_count: i32,
    pub standby_mode: HostStandbyMode,
    pub local_templates: Vec<String>,
    pub local_datastores: Vec<String>,
    /// Name of the resource pool this host reports into. Not named in
    /// the distilled spec but present in the system this was modeled
    /// on; the Capabilities Cache groups free-slot accounting by this
    /// field when resource pools (rather than raw hosts) are the unit
    /// of placement.
    pub associated_resource_pool: String,
}

impl HostRuntimeInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, mo_ref: impl Into<String>) -> Self {
        Self {
            id: None,
            modified_at: chrono::Utc::now(),
            created_at: timestamp_not_initialized(),
            name: name.into(),
            mo_ref: mo_ref.into(),
            maintenance: true,
            to_be_in_maintenance: false,
            connection_state: HostConnectionState::NotResponding,
            vms_count: 0,
            vms_running_count: 0,
            standby_mode: HostStandbyMode::In,
            local_templates: Vec::new(),
            local_datastores: Vec::new(),
            associated_resource_pool: String::new(),
        }
    }

    /// `true` once the host accepts new deployments: not in (or
    /// entering) maintenance, and reachable.
    #[must_use]
    pub fn is_schedulable(&self) -> bool {
        !self.maintenance
            && !self.to_be_in_maintenance
            && self.connection_state == HostConnectionState::Connected
    }
}

impl Document for HostRuntimeInfo {
    fn type_name() -> &'static str {
        "host_runtime_info"
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn redacted_view(&self, _show_hidden: bool) -> Value {
        json!({
            "id": self.id,
            "modified_at": self.modified_at,
            "created_at": self.created_at,
            "name": self.name,
            "mo_ref": self.mo_ref,
            "maintenance": self.maintenance,
            "to_be_in_maintenance": self.to_be_in_maintenance,
            "connection_state": self.connection_state,
            "vms_count": self.vms_count,
            "vms_running_count": self.vms_running_count,
            "standby_mode": self.standby_mode,
            "associated_resource_pool": self.associated_resource_pool,
            // local_templates/local_datastores carry raw hypervisor
            // inventory noise, redacted from the general HTTP view.
        })
    }
}

/// A point-in-time snapshot of a [`Machine`]'s disk state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub created_at: Timestamp,
    pub name: String,
    pub machine: String,
    pub status: String,
}

impl Snapshot {
    #[must_use]
    pub fn new(name: impl Into<String>, machine: impl Into<String>) -> Self {
        Self {
            id: None,
            created_at: chrono::Utc::now(),
            name: name.into(),
            machine: machine.into(),
            status: "not_created".to_string(),
        }
    }

    /// Name used on the hypervisor side, disambiguated by creation
    /// time so repeated snapshots of the same machine don't collide.
    #[must_use]
    pub fn unique_name(&self) -> String {
        format!("{}_{}", self.name, self.created_at.format("%Y-%m-%dT%H:%M:%S%.f"))
    }
}

impl Document for Snapshot {
    fn type_name() -> &'static str {
        "snapshot"
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn redacted_view(&self, _show_hidden: bool) -> Value {
        json!({
            "id": self.id,
            "created_at": self.created_at,
            "name": self.name,
            "machine": self.machine,
            "status": self.status,
        })
    }
}

/// A captured screen image of a [`Machine`]'s console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub created_at: Timestamp,
    pub file_type: String,
    pub image_base64: String,
    pub machine: String,
    pub status: String,
}

impl Screenshot {
    #[must_use]
    pub fn new(machine: impl Into<String>) -> Self {
        Self {
            id: None,
            created_at: chrono::Utc::now(),
            file_type: "png".to_string(),
            image_base64: String::new(),
            machine: machine.into(),
            status: "not_obtained".to_string(),
        }
    }
}

impl Document for Screenshot {
    fn type_name() -> &'static str {
        "screenshot"
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn redacted_view(&self, _show_hidden: bool) -> Value {
        json!({
            "id": self.id,
            "created_at": self.created_at,
            "file_type": self.file_type,
            "image_base64": truncate_field(&self.image_base64, SCREENSHOT_PREVIEW_BYTES),
            "machine": self.machine,
            "status": self.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_owner_hidden_unless_admin() {
        let m = Machine::new("default", "alice");
        let view = m.redacted_view(false);
        assert!(view.get("owner").is_none());
        let admin_view = m.redacted_view(true);
        assert_eq!(admin_view["owner"], json!("alice"));
    }

    #[test]
    fn screenshot_body_truncated() {
        let mut s = Screenshot::new("m-1");
        s.image_base64 = "a".repeat(1000);
        let view = s.redacted_view(false);
        let rendered = view["image_base64"].as_str().unwrap();
        assert!(rendered.len() < 1000);
        assert!(rendered.contains("more bytes"));
    }

    #[test]
    fn deploy_ticket_separator_not_claimable_via_normal_flow() {
        let sep = DeployTicket::new_separator();
        assert!(sep.is_separator());
        assert_eq!(sep.taken, i32::from(ActionLock::Finished));
    }

    #[test]
    fn host_runtime_info_schedulable_requires_connected_and_not_in_maintenance() {
        let mut host = HostRuntimeInfo::new("esx-1", "host-1");
        assert!(!host.is_schedulable());
        host.maintenance = false;
        host.connection_state = HostConnectionState::Connected;
        assert!(host.is_schedulable());
        host.to_be_in_maintenance = true;
        assert!(!host.is_schedulable());
    }
}
