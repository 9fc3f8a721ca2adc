//! Layered YAML/environment configuration for vmctl: coded defaults,
//! an optional settings file, environment overrides.

pub mod config;
pub mod error;

pub use config::{
    CapabilitiesSettings, DbSettings, DelayedSettings, HttpSettings, Settings, TicketeerSettings,
    UnitSettings, VsphereSettings, WorkerSettings,
};
pub use error::{Error, Result};
