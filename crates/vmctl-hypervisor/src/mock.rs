//! A deterministic in-memory [`HypervisorAdapter`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use vmctl_types::{HostRuntimeInfo, Machine};

use crate::error::{HypervisorError, Result};
use crate::{HypervisorAdapter, MachineInfo, PowerState, TicketedDeploy};

#[derive(Debug, Clone)]
struct MockMachine {
    power_state: PowerState,
    ip_addresses: Vec<String>,
    nos_id: String,
    machine_name: String,
    machine_search_link: String,
    mo_ref: String,
    snapshots: Vec<String>,
}

/// In-memory hypervisor stand-in. Every deployed machine gets a
/// sequentially assigned `vm-N` provider id; state transitions are
/// tracked in a `Mutex<HashMap>` so the adapter can be shared across
/// threads the way a real client connection pool would be.
#[derive(Default)]
pub struct MockAdapter {
    machines: Mutex<HashMap<String, MockMachine>>,
    next_id: Mutex<u64>,
    hosts: Mutex<Vec<HostRuntimeInfo>>,
}

impl MockAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the folder listing [`HypervisorAdapter::get_hosts_in_folder`]
    /// returns, for tests exercising the Host-Info Obtainer or Ticket
    /// Scheduler.
    pub fn seed_hosts(&self, hosts: Vec<HostRuntimeInfo>) {
        *self.hosts.lock().unwrap() = hosts;
    }

    fn next_provider_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("vm-{next}")
    }

    fn get_machine(&self, provider_id: &str) -> Result<MockMachine> {
        self.machines
            .lock()
            .unwrap()
            .get(provider_id)
            .cloned()
            .ok_or_else(|| HypervisorError::NotFound(provider_id.to_string()))
    }
}

impl HypervisorAdapter for MockAdapter {
    fn deploy(&self, machine: &Machine, _template: &str, _network: &str, running_hint: bool, _folder: &str) -> Result<String> {
        let id = self.next_provider_id();
        let suffix = id.strip_prefix("vm-").unwrap_or(&id).to_string();
        self.machines.lock().unwrap().insert(
            id.clone(),
            MockMachine {
                power_state: if running_hint { PowerState::PoweredOn } else { PowerState::PoweredOff },
                ip_addresses: vec!["10.0.0.1".to_string()],
                nos_id: format!("nos-{suffix}"),
                machine_name: machine.custom_machine_name.clone(),
                machine_search_link: format!("https://mock.invalid/vm/{suffix}"),
                mo_ref: format!("moref-{suffix}"),
                snapshots: Vec::new(),
            },
        );
        Ok(id)
    }

    fn deploy_via_ticket(
        &self,
        machine: &Machine,
        template: &str,
        network: &str,
        running_hint: bool,
        folder: &str,
        _ticket_host_moref: &str,
    ) -> Result<TicketedDeploy> {
        let uuid = self.deploy(machine, template, network, running_hint, folder)?;
        let mo_ref = self.get_machine(&uuid)?.mo_ref;
        Ok(TicketedDeploy { uuid, mo_ref })
    }

    fn config_network(&self, provider_id: &str, _network: &str) -> Result<()> {
        self.get_machine(provider_id).map(|_| ())
    }

    fn start(&self, provider_id: &str) -> Result<()> {
        let mut machines = self.machines.lock().unwrap();
        let m = machines
            .get_mut(provider_id)
            .ok_or_else(|| HypervisorError::NotFound(provider_id.to_string()))?;
        m.power_state = PowerState::PoweredOn;
        Ok(())
    }

    fn stop(&self, provider_id: &str) -> Result<()> {
        let mut machines = self.machines.lock().unwrap();
        let m = machines
            .get_mut(provider_id)
            .ok_or_else(|| HypervisorError::NotFound(provider_id.to_string()))?;
        m.power_state = PowerState::PoweredOff;
        Ok(())
    }

    fn reset(&self, provider_id: &str) -> Result<()> {
        self.stop(provider_id)?;
        self.start(provider_id)
    }

    fn undeploy(&self, provider_id: &str) -> Result<()> {
        self.machines
            .lock()
            .unwrap()
            .remove(provider_id)
            .ok_or_else(|| HypervisorError::NotFound(provider_id.to_string()))?;
        Ok(())
    }

    fn get_machine_info(&self, provider_id: &str) -> Result<MachineInfo> {
        let m = self.get_machine(provider_id)?;
        Ok(MachineInfo {
            power_state: m.power_state,
            ip_addresses: m.ip_addresses,
            nos_id: m.nos_id,
            machine_name: m.machine_name,
            machine_search_link: m.machine_search_link,
            mo_ref: m.mo_ref,
        })
    }

    fn take_snapshot(&self, provider_id: &str, snapshot_name: &str) -> Result<()> {
        let mut machines = self.machines.lock().unwrap();
        let m = machines
            .get_mut(provider_id)
            .ok_or_else(|| HypervisorError::NotFound(provider_id.to_string()))?;
        m.snapshots.push(snapshot_name.to_string());
        Ok(())
    }

    fn revert_snapshot(&self, provider_id: &str, snapshot_name: &str) -> Result<()> {
        let machines = self.machines.lock().unwrap();
        let m = machines
            .get(provider_id)
            .ok_or_else(|| HypervisorError::NotFound(provider_id.to_string()))?;
        if !m.snapshots.iter().any(|s| s == snapshot_name) {
            return Err(HypervisorError::NotFound(snapshot_name.to_string()));
        }
        Ok(())
    }

    fn remove_snapshot(&self, provider_id: &str, snapshot_name: &str) -> Result<()> {
        let mut machines = self.machines.lock().unwrap();
        let m = machines
            .get_mut(provider_id)
            .ok_or_else(|| HypervisorError::NotFound(provider_id.to_string()))?;
        m.snapshots.retain(|s| s != snapshot_name);
        Ok(())
    }

    fn take_screenshot(&self, provider_id: &str) -> Result<String> {
        self.get_machine(provider_id)?;
        Ok("mock-base64-png".to_string())
    }

    fn get_hosts_in_folder(&self, _folder: &str) -> Result<Vec<HostRuntimeInfo>> {
        Ok(self.hosts.lock().unwrap().clone())
    }

    fn idle(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmctl_types::Machine;

    #[test]
    fn deploy_then_start_stop_roundtrip() {
        let adapter = MockAdapter::new();
        let machine = Machine::new("default", "alice");
        let id = adapter.deploy(&machine, "tmpl", "net", true, "folder").unwrap();
        let info = adapter.get_machine_info(&id).unwrap();
        assert_eq!(info.power_state, PowerState::PoweredOn);
        assert!(!info.nos_id.is_empty());
        assert!(!info.mo_ref.is_empty());

        adapter.stop(&id).unwrap();
        assert_eq!(adapter.get_machine_info(&id).unwrap().power_state, PowerState::PoweredOff);
    }

    #[test]
    fn deploy_without_running_hint_is_powered_off() {
        let adapter = MockAdapter::new();
        let machine = Machine::new("default", "alice");
        let id = adapter.deploy(&machine, "tmpl", "net", false, "folder").unwrap();
        assert_eq!(adapter.get_machine_info(&id).unwrap().power_state, PowerState::PoweredOff);
    }

    #[test]
    fn deploy_via_ticket_returns_a_mo_ref() {
        let adapter = MockAdapter::new();
        let machine = Machine::new("default", "alice");
        let deployed = adapter.deploy_via_ticket(&machine, "tmpl", "net", true, "folder", "host-1").unwrap();
        assert!(!deployed.uuid.is_empty());
        assert!(!deployed.mo_ref.is_empty());
    }

    #[test]
    fn undeploy_then_get_info_not_found() {
        let adapter = MockAdapter::new();
        let machine = Machine::new("default", "alice");
        let id = adapter.deploy(&machine, "tmpl", "net", true, "folder").unwrap();
        adapter.undeploy(&id).unwrap();
        assert!(matches!(
            adapter.get_machine_info(&id),
            Err(HypervisorError::NotFound(_))
        ));
    }

    #[test]
    fn snapshot_lifecycle() {
        let adapter = MockAdapter::new();
        let machine = Machine::new("default", "alice");
        let id = adapter.deploy(&machine, "tmpl", "net", true, "folder").unwrap();
        adapter.take_snapshot(&id, "snap-1").unwrap();
        adapter.revert_snapshot(&id, "snap-1").unwrap();
        adapter.remove_snapshot(&id, "snap-1").unwrap();
        assert!(adapter.revert_snapshot(&id, "snap-1").is_err());
    }
}
