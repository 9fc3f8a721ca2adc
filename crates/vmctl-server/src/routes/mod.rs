//! `/api/v4` route handlers, one module per resource.

pub mod capabilities;
pub mod hosts;
pub mod machines;
pub mod requests;
pub mod screenshots;
pub mod snapshots;
pub mod uptime;
