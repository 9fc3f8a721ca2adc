//! # vmctl-types: Core entity and enum definitions
//!
//! This crate contains the shared document types persisted by the
//! Document Store Adapter and exchanged over the HTTP Intake:
//! - Queue entities ([`Request`], [`Action`])
//! - Inventory entities ([`Machine`], [`DeployTicket`], [`HostRuntimeInfo`])
//! - Artifact entities ([`Snapshot`], [`Screenshot`])
//! - State enums ([`MachineState`], [`RequestState`], [`RequestType`])
//!
//! Every entity implements [`Document`], which carries the handful of
//! behaviours the rest of the system relies on regardless of which kind
//! of row it is looking at: a primary key, a `modified_at` stamp, a lock
//! field for claim queries, and a redacted JSON projection for the HTTP
//! layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

pub mod document;
pub mod entities;
pub mod enums;

pub use document::Document;
pub use entities::{Action, DeployTicket, HostRuntimeInfo, Machine, Request, Screenshot, Snapshot};
pub use enums::{HostConnectionState, HostStandbyMode, MachineState, RequestState, RequestType};

/// Timestamp type used across every entity. Stored as UTC, compared
/// against `NOT_INITIALIZED` to detect fields that were never set.
pub type Timestamp = DateTime<Utc>;

/// Sentinel returned in place of a real timestamp for fields the
/// original system represented as `datetime.MAXYEAR` ("never").
#[must_use]
pub fn timestamp_not_initialized() -> Timestamp {
    DateTime::<Utc>::from_timestamp(253_402_214_400, 0).expect("valid far-future instant")
}

/// Free-form attribute map used by [`Document::redacted_view`] before a
/// concrete entity renders it into typed JSON. Keeping this as a
/// `BTreeMap` (rather than `serde_json::Map`, which is a thin
/// `IndexMap`/`BTreeMap` wrapper already) gives deterministic key
/// ordering in the wire payload, which simplifies golden-file tests.
pub type AttributeMap = BTreeMap<String, Value>;
