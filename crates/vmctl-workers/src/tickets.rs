//! Deploy-ticket bind/release helpers shared by the Deploy and Ops
//! Workers. Claiming a ticket (picking the oldest free, enabled one)
//! lives in the `vmctl` binary alongside the rest of claim-and-dispatch;
//! everything downstream of a claim — binding it to the VM it produced,
//! releasing it back to the pool — lives here.

use serde_json::json;
use vmctl_store::adapter;
use vmctl_types::{ActionLock, DeployTicket};

use crate::error::Result;

/// Binds the ticket claimed for `host_moref` to the VM it produced,
/// once a ticketed deploy succeeds.
pub fn bind(tx: &mut postgres::Transaction<'_>, host_moref: &str, vm_moref: &str) -> Result<()> {
    let candidates: Vec<DeployTicket> = adapter::find(
        tx,
        &[
            ("host_moref".to_string(), json!(host_moref)),
            ("taken".to_string(), json!(i32::from(ActionLock::Sleeping))),
            ("assigned_vm_moref".to_string(), json!("")),
        ],
    )?;
    if let Some(mut ticket) = candidates.into_iter().next() {
        ticket.assigned_vm_moref = vm_moref.to_string();
        adapter::update(tx, &ticket)?;
    }
    Ok(())
}

/// Releases the ticket claimed for `host_moref` that a failed ticketed
/// deploy never got to bind.
pub fn release_by_host(tx: &mut postgres::Transaction<'_>, host_moref: &str) -> Result<()> {
    release_matching(
        tx,
        &[
            ("host_moref".to_string(), json!(host_moref)),
            ("taken".to_string(), json!(i32::from(ActionLock::Sleeping))),
            ("assigned_vm_moref".to_string(), json!("")),
        ],
    )
}

/// Releases the ticket bound to `vm_moref`, e.g. on undeploy or stop.
/// A no-op if the machine was never deployed via a ticket.
pub fn release_by_vm_moref(tx: &mut postgres::Transaction<'_>, vm_moref: &str) -> Result<()> {
    if vm_moref.is_empty() {
        return Ok(());
    }
    release_matching(tx, &[("assigned_vm_moref".to_string(), json!(vm_moref))])
}

fn release_matching(tx: &mut postgres::Transaction<'_>, filters: &[(String, serde_json::Value)]) -> Result<()> {
    let candidates: Vec<DeployTicket> = adapter::find(tx, filters)?;
    for mut ticket in candidates {
        ticket.taken = ActionLock::Free.into();
        ticket.assigned_vm_moref = String::new();
        adapter::update(tx, &ticket)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    // bind/release each need a live transaction against `documents`;
    // covered by the Deploy/Ops Worker tests that exercise them through
    // `try_deploy`/`action_undeploy`/`action_stop` instead of in isolation.
}
