//! # vmctl-rbac: the owner-vs-admin authorization boundary
//!
//! The system has no general-purpose permission model: a caller either
//! owns the [`Machine`](vmctl_types::Machine) they're operating on, or
//! they hold the admin role and bypass ownership entirely. This crate
//! is deliberately small — [`roles::Role`] plus
//! [`enforcement::PolicyEnforcer`] — because that is the entire
//! authorization surface the HTTP Intake needs.
//!
//! ```
//! use vmctl_rbac::{PolicyEnforcer, Role};
//!
//! let enforcer = PolicyEnforcer::new(Role::User, "alice");
//! assert!(enforcer.enforce_machine_access("alice").is_ok());
//! assert!(enforcer.enforce_machine_access("bob").is_err());
//! ```

pub mod enforcement;
pub mod roles;

pub use enforcement::{EnforcementError, PolicyEnforcer};
pub use roles::Role;
