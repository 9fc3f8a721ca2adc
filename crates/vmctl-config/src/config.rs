//! Hierarchical application settings: coded defaults, overridden by an
//! optional YAML file, overridden by `VMCTL__*` environment variables —
//! the same three-layer precedence the system this was modeled on
//! applies through its settings module, just sourced from YAML/env
//! instead of a single Python dict literal.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Database connection settings shared by the blocking and async pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbSettings {
    /// `postgres`-style DSN (`host=... user=... dbname=...`).
    pub dsn: String,
    pub blocking_pool_size: u32,
    pub async_pool_size: usize,
}

/// Deploy/Ops worker loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub loop_initial_sleep_ms: u64,
    pub loop_idle_sleep_ms: u64,
    pub idle_counter_threshold: u32,
    pub load_refresh_interval: u32,
    /// Whether a successful `start` enqueues a follow-up `get_info` request.
    pub enqueue_get_machine_info: bool,
}

/// Delayed Reaper loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayedSettings {
    pub sleep_ms: u64,
}

/// Ticket Scheduler loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketeerSettings {
    pub sleep_ms: u64,
    pub slot_limit: i32,
}

/// Hypervisor-facing settings; `hosts_folder_name` being empty disables
/// the Host-Info Obtainer and Ticket Scheduler's host discovery entirely,
/// mirroring the original's falsy-string-means-disabled convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VsphereSettings {
    pub hosts_folder_name: String,
    #[serde(default)]
    pub socket_default_timeout_secs: Option<u64>,
}

/// HTTP Intake bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    pub bind_address: String,
    pub warning_time_ms: u64,
    pub exception_time_ms: u64,
    /// Tag new machines with the caller's login and scope `GET
    /// /machines` to owned machines unless the caller is admin.
    pub personalised: bool,
}

/// Capabilities Cache tuning: how long a computed `{slot_limit,
/// free_slots}` snapshot is trusted before the next call recomputes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesSettings {
    pub caching_period_secs: u64,
    /// Once used slots exceed this percentage of `slot_limit`, every
    /// call recomputes regardless of `caching_period_secs`.
    pub caching_enabled_threshold_pct: u8,
}

/// Identity of this deployment unit and the template labels it is
/// allowed to deploy, surfaced verbatim by `GET /capabilities`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSettings {
    pub name: String,
    pub labels: Vec<String>,
    /// Suffix a `template:` label can end with to skip the
    /// `labels` membership check entirely (e.g. ad-hoc templates).
    #[serde(default)]
    pub skip_template_validation_for_suffix: String,
}

/// Root settings object, deserialized from the layered config sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub db: DbSettings,
    pub worker: WorkerSettings,
    pub delayed: DelayedSettings,
    pub ticketeer: TicketeerSettings,
    pub vsphere: VsphereSettings,
    pub http: HttpSettings,
    pub capabilities: CapabilitiesSettings,
    pub unit: UnitSettings,
}

impl Settings {
    /// Loads settings from coded defaults, an optional YAML file at
    /// `path` (skipped entirely if it doesn't exist), and `VMCTL__*`
    /// environment variables (`__` separates nesting, e.g.
    /// `VMCTL__DB__DSN`).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Load`] if a source fails to parse
    /// or the merged result doesn't match [`Settings`]'s shape.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("db.dsn", "host=localhost user=vmctl dbname=vmctl")?
            .set_default("db.blocking_pool_size", 8)?
            .set_default("db.async_pool_size", 16)?
            .set_default("worker.loop_initial_sleep_ms", 200)?
            .set_default("worker.loop_idle_sleep_ms", 2000)?
            .set_default("worker.idle_counter_threshold", 50)?
            .set_default("worker.load_refresh_interval", 100)?
            .set_default("worker.enqueue_get_machine_info", true)?
            .set_default("delayed.sleep_ms", 1000)?
            .set_default("ticketeer.sleep_ms", 5000)?
            .set_default("ticketeer.slot_limit", 40)?
            .set_default("vsphere.hosts_folder_name", "")?
            .set_default("http.bind_address", "0.0.0.0:8080")?
            .set_default("http.warning_time_ms", 500)?
            .set_default("http.exception_time_ms", 5000)?
            .set_default("http.personalised", true)?
            .set_default("capabilities.caching_period_secs", 15)?
            .set_default("capabilities.caching_enabled_threshold_pct", 80)?
            .set_default("unit.name", "default")?
            .set_default("unit.labels", Vec::<String>::new())?
            .set_default("unit.skip_template_validation_for_suffix", "")?;

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path.to_path_buf()));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VMCTL")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Default config file path: `$XDG_CONFIG_HOME/vmctl/settings.yaml`
    /// (or platform equivalent via the `directories` crate), used when
    /// the caller doesn't pass an explicit path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "kimberlite", "vmctl")
            .map(|dirs| dirs.config_dir().join("settings.yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.db.blocking_pool_size, 8);
        assert_eq!(settings.ticketeer.slot_limit, 40);
        assert!(settings.vsphere.hosts_folder_name.is_empty());
    }

    #[test]
    fn missing_file_path_falls_back_to_defaults() {
        let settings = Settings::load(Some(Path::new("/nonexistent/settings.yaml"))).unwrap();
        assert_eq!(settings.worker.loop_idle_sleep_ms, 2000);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "ticketeer:\n  slot_limit: 80\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.ticketeer.slot_limit, 80);
        assert_eq!(settings.db.blocking_pool_size, 8);
    }
}
