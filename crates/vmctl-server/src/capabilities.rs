//! The Capabilities Cache: `{slot_limit, free_slots, labels}`,
//! recomputed at most once per `caching_period_secs` unless
//! utilization crosses `caching_enabled_threshold_pct` or a caller
//! forces a refresh.
//!
//! Grounded on the system this was modeled on's
//! `Capabilities.fetch`/`get_free_slots`/`get_slot_limit` static-state
//! module: two free-slot formulas depending on whether the unit is
//! host-slotted (a `vsphere.hosts_folder_name` is configured) or not.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio_postgres::Client;
use vmctl_config::Settings;
use vmctl_store::async_adapter;
use vmctl_types::{DeployTicket, HostRuntimeInfo, Machine, MachineState};

use crate::error::ServerResult;

/// Snapshot served by `GET /capabilities` and embedded in deploy
/// request-status responses.
#[derive(Debug, Clone)]
pub struct CapabilitiesSnapshot {
    pub slot_limit: i32,
    pub free_slots: i32,
    pub labels: Vec<String>,
}

struct Cached {
    snapshot: CapabilitiesSnapshot,
    last_check: Instant,
}

/// Shared, lazily-recomputed capacity figure. One instance lives in
/// [`crate::state::AppState`] for the whole process.
pub struct Capabilities {
    cached: Mutex<Cached>,
    caching_period: Duration,
    caching_enabled_threshold_pct: u8,
    hosts_folder_configured: bool,
    unit_labels: Vec<String>,
    /// The statically configured `ticketeer.slot_limit`, kept separate
    /// from `cached.snapshot.slot_limit` so each recompute derives
    /// `vm_per_host` from the real configuration instead of the
    /// previous recompute's already-derived figure.
    configured_slot_limit: i32,
}

impl Capabilities {
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let labels: Vec<String> = settings
            .unit
            .labels
            .iter()
            .cloned()
            .chain(std::iter::once(format!("unit:{}", settings.unit.name)))
            .collect();
        Self {
            cached: Mutex::new(Cached {
                snapshot: CapabilitiesSnapshot {
                    slot_limit: settings.ticketeer.slot_limit,
                    free_slots: 0,
                    labels: labels.clone(),
                },
                last_check: Instant::now() - Duration::from_secs(u64::from(settings.capabilities.caching_period_secs) + 1),
            }),
            caching_period: Duration::from_secs(settings.capabilities.caching_period_secs),
            caching_enabled_threshold_pct: settings.capabilities.caching_enabled_threshold_pct,
            hosts_folder_configured: !settings.vsphere.hosts_folder_name.is_empty(),
            unit_labels: labels,
            configured_slot_limit: settings.ticketeer.slot_limit,
        }
    }

    /// Returns the current snapshot, recomputing it first if caching
    /// rules or `forced` call for a fresh read.
    ///
    /// # Errors
    ///
    /// Returns [`vmctl_store::StoreError`] if the underlying queries fail.
    pub async fn fetch(&self, client: &Client, forced: bool) -> ServerResult<CapabilitiesSnapshot> {
        let should_refresh = {
            let cached = self.cached.lock().expect("capabilities mutex poisoned");
            needs_refresh(
                cached.snapshot.slot_limit,
                cached.snapshot.free_slots,
                self.caching_enabled_threshold_pct,
                forced,
                cached.last_check.elapsed(),
                self.caching_period,
            )
        };

        if should_refresh {
            let snapshot = self.recompute(client).await?;
            let mut cached = self.cached.lock().expect("capabilities mutex poisoned");
            cached.snapshot = snapshot;
            cached.last_check = Instant::now();
        }

        Ok(self.cached.lock().expect("capabilities mutex poisoned").snapshot.clone())
    }

    async fn recompute(&self, client: &Client) -> ServerResult<CapabilitiesSnapshot> {
        if self.hosts_folder_configured {
            let not_in_maintenance: Vec<HostRuntimeInfo> =
                async_adapter::find(client, &[("maintenance".to_string(), json!("false"))]).await?;
            let ready_hosts: Vec<_> = not_in_maintenance.into_iter().filter(|h| !h.to_be_in_maintenance).collect();
            let all_hosts: Vec<HostRuntimeInfo> = async_adapter::find(client, &[]).await?;
            let base_slot_limit = self.configured_slot_limit.max(1);
            let vm_per_host = if all_hosts.is_empty() { 0 } else { base_slot_limit / all_hosts.len() as i32 };
            let slot_limit = vm_per_host * ready_hosts.len() as i32;

            let free_tickets: Vec<DeployTicket> = async_adapter::find(
                client,
                &[("taken".to_string(), json!("0")), ("enabled".to_string(), json!("true"))],
            )
            .await?;
            let free_slots = (free_tickets.len() as i32).min(slot_limit);

            Ok(CapabilitiesSnapshot {
                slot_limit,
                free_slots,
                labels: self.unit_labels.clone(),
            })
        } else {
            let slot_limit = self.configured_slot_limit;
            let running: Vec<Machine> =
                async_adapter::find(client, &[("state".to_string(), json!(MachineState::Running))]).await?;
            let deployed: Vec<Machine> =
                async_adapter::find(client, &[("state".to_string(), json!(MachineState::Deployed))]).await?;
            let created: Vec<Machine> =
                async_adapter::find(client, &[("state".to_string(), json!(MachineState::Created))]).await?;
            let used = running.len() + deployed.len() + created.len();
            let free_slots = (slot_limit - used as i32).max(0);

            Ok(CapabilitiesSnapshot {
                slot_limit,
                free_slots,
                labels: self.unit_labels.clone(),
            })
        }
    }
}

impl CapabilitiesSnapshot {
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "slot_limit": self.slot_limit,
            "free_slots": self.free_slots,
            "labels": self.labels,
        })
    }
}

/// `true` once a cached snapshot is stale enough that `fetch` should
/// recompute before answering: a forced call, usage past
/// `threshold_pct` of `slot_limit`, or `caching_period` elapsed.
fn needs_refresh(slot_limit: i32, free_slots: i32, threshold_pct: u8, forced: bool, elapsed: Duration, caching_period: Duration) -> bool {
    let used = slot_limit - free_slots;
    let threshold = (f64::from(slot_limit) * f64::from(threshold_pct) / 100.0) as i32;
    forced || used > threshold || elapsed > caching_period
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmctl_config::Settings;

    #[test]
    fn forced_always_refreshes() {
        assert!(needs_refresh(40, 40, 80, true, Duration::ZERO, Duration::from_secs(60)));
    }

    #[test]
    fn fresh_and_under_threshold_skips_refresh() {
        // 40 slots, 35 free -> 5 used, well under 80% of 40 (32).
        assert!(!needs_refresh(40, 35, 80, false, Duration::from_secs(1), Duration::from_secs(60)));
    }

    #[test]
    fn usage_past_threshold_forces_refresh_even_if_fresh() {
        // 40 slots, 5 free -> 35 used, over 80% of 40 (32).
        assert!(needs_refresh(40, 5, 80, false, Duration::from_secs(1), Duration::from_secs(60)));
    }

    #[test]
    fn elapsed_past_caching_period_forces_refresh() {
        assert!(needs_refresh(40, 40, 80, false, Duration::from_secs(61), Duration::from_secs(60)));
    }

    #[test]
    fn new_tags_labels_with_unit_name() {
        let mut settings = Settings::load(None).unwrap();
        settings.unit.name = "lab1".to_string();
        settings.unit.labels = vec!["gpu".to_string()];
        let capabilities = Capabilities::new(&settings);
        assert_eq!(capabilities.unit_labels, vec!["gpu".to_string(), "unit:lab1".to_string()]);
    }

    #[test]
    fn new_pins_the_configured_slot_limit_separately_from_the_cache() {
        let mut settings = Settings::load(None).unwrap();
        settings.ticketeer.slot_limit = 40;
        let capabilities = Capabilities::new(&settings);
        assert_eq!(capabilities.configured_slot_limit, 40);
        // The cache's own snapshot starts out matching it, but that
        // field is what recompute() would otherwise keep re-deriving
        // from if it didn't hold its own copy.
        assert_eq!(capabilities.cached.lock().unwrap().snapshot.slot_limit, 40);
    }
}
