//! Host-Info Obtainer: refreshes [`HostRuntimeInfo`] rows from the
//! hypervisor's live host inventory, upserting by host name. Each
//! host's facts are fetched defensively — a single host that errors
//! out is logged and skipped rather than aborting the whole refresh.

use serde_json::json;
use tracing::warn;
use vmctl_hypervisor::HypervisorAdapter;
use vmctl_store::adapter;
use vmctl_types::HostRuntimeInfo;

use crate::error::Result;

/// Refreshes every host the hypervisor reports under `folder`, upserting
/// into `host_runtime_info` by host name. Returns the number of hosts
/// successfully refreshed.
///
/// # Errors
///
/// Returns the underlying store error; a failure fetching one host from
/// the hypervisor is logged and that host is skipped, not propagated.
pub fn refresh_hosts(
    tx: &mut postgres::Transaction<'_>,
    hv: &dyn HypervisorAdapter,
    folder: &str,
) -> Result<usize> {
    let hosts = match hv.get_hosts_in_folder(folder) {
        Ok(hosts) => hosts,
        Err(err) => {
            warn!(%err, folder, "failed to list hosts from hypervisor");
            return Ok(0);
        }
    };

    let current_names: std::collections::HashSet<String> = hosts.iter().map(|h| h.name.clone()).collect();

    let mut refreshed = 0;
    for fresh in hosts {
        if let Err(err) = upsert_one(tx, fresh) {
            warn!(%err, "failed to persist host info for one host, skipping");
            continue;
        }
        refreshed += 1;
    }

    delete_stale(tx, &current_names)?;

    Ok(refreshed)
}

/// Deletes every persisted `HostRuntimeInfo` whose name wasn't in the
/// hypervisor's latest report — the Obtainer's upsert never learns a
/// host has been removed from the folder any other way.
fn delete_stale(tx: &mut postgres::Transaction<'_>, current_names: &std::collections::HashSet<String>) -> Result<()> {
    let existing: Vec<HostRuntimeInfo> = adapter::find(tx, &[])?;
    for host in existing {
        if !current_names.contains(&host.name) {
            adapter::delete::<_, HostRuntimeInfo>(tx, host.id.unwrap_or_default())?;
        }
    }
    Ok(())
}

fn upsert_one(tx: &mut postgres::Transaction<'_>, fresh: HostRuntimeInfo) -> Result<()> {
    let existing: Vec<HostRuntimeInfo> =
        adapter::find(tx, &[("name".to_string(), json!(fresh.name))])?;

    if let Some(mut current) = existing.into_iter().next() {
        current.maintenance = fresh.maintenance;
        current.to_be_in_maintenance = fresh.to_be_in_maintenance;
        current.vms_count = fresh.vms_count;
        current.vms_running_count = fresh.vms_running_count;
        current.connection_state = fresh.connection_state;
        current.standby_mode = fresh.standby_mode;
        current.local_templates = fresh.local_templates;
        current.local_datastores = fresh.local_datastores;
        current.associated_resource_pool = fresh.associated_resource_pool;
        current.modified_at = chrono::Utc::now();
        adapter::update(tx, &current)?;
    } else {
        adapter::insert(tx, fresh)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmctl_hypervisor::mock::MockAdapter;

    #[test]
    fn refresh_with_no_hosts_reports_zero() {
        let hv = MockAdapter::new();
        assert_eq!(hv.get_hosts_in_folder("dc1").unwrap().len(), 0);
    }

    #[test]
    fn seeded_hosts_are_returned_by_the_mock() {
        let hv = MockAdapter::new();
        hv.seed_hosts(vec![HostRuntimeInfo::new("esx-1", "host-1")]);
        let hosts = hv.get_hosts_in_folder("dc1").unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "esx-1");
    }
}
