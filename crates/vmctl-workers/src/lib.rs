//! Worker loops: Deploy Worker, Ops Worker, Delayed Reaper, Ticket
//! Scheduler and Host-Info Obtainer. Each is a small blocking
//! claim/process/sleep loop driven by [`loop_runner::run`] against its
//! own [`vmctl_store::conn::BlockingPool`] connection.

pub mod deploy;
pub mod error;
pub mod hostinfo;
pub mod labels;
pub mod loop_runner;
pub mod ops;
pub mod reaper;
pub mod ticketeer;
pub mod tickets;

pub use error::{Result, WorkerError};
