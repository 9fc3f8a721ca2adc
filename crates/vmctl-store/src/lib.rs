//! # vmctl-store: Document Store Adapter and Connection Manager
//!
//! Persists every [`vmctl_types::Document`] in a single polymorphic
//! `documents(id, type, data JSONB)` table, and provides the two
//! connection modes the rest of the system is built around:
//! - [`conn::BlockingPool`] for worker loops, which own one connection
//!   for the process lifetime and issue blocking queries.
//! - [`conn::AsyncPool`] for the HTTP Intake, which drives many
//!   concurrent cooperative-async requests against a shared pool and
//!   bounds each call with [`conn::AsyncDeadline`].

pub mod adapter;
pub mod async_adapter;
pub mod conn;
pub mod error;
pub mod filter;
pub mod tx;

pub use error::{Result, StoreError};
