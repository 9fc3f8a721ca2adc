//! Policy enforcement logic: the owner-vs-admin authorization boundary.
//!
//! A [`Machine`](vmctl_types::Machine) is tagged with an `owner` login.
//! Every mutating or machine-scoped HTTP operation must check the
//! caller either owns the machine or holds [`Role::Admin`] before it is
//! allowed through.

use thiserror::Error;
use tracing::warn;

use crate::roles::Role;

/// Error type for policy enforcement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnforcementError {
    /// Caller neither owns the machine nor is an admin.
    #[error("{caller} is not authorised to access machine owned by {owner}")]
    NotOwner { caller: String, owner: String },
}

/// Result type for enforcement operations.
pub type Result<T> = std::result::Result<T, EnforcementError>;

/// Policy enforcement engine: one call, one decision.
pub struct PolicyEnforcer {
    role: Role,
    caller: String,
}

impl PolicyEnforcer {
    #[must_use]
    pub fn new(role: Role, caller: impl Into<String>) -> Self {
        Self {
            role,
            caller: caller.into(),
        }
    }

    /// Checks that the caller may act on a machine owned by `owner`.
    /// Admins always pass; everyone else must match `owner` exactly.
    ///
    /// # Errors
    ///
    /// Returns [`EnforcementError::NotOwner`] if the caller is neither
    /// the owner nor an admin.
    pub fn enforce_machine_access(&self, owner: &str) -> Result<()> {
        if self.role == Role::Admin || self.caller == owner {
            return Ok(());
        }
        warn!(caller = %self.caller, %owner, "machine access denied");
        Err(EnforcementError::NotOwner {
            caller: self.caller.clone(),
            owner: owner.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_is_always_allowed() {
        let enforcer = PolicyEnforcer::new(Role::User, "alice");
        assert!(enforcer.enforce_machine_access("alice").is_ok());
    }

    #[test]
    fn non_owner_user_is_denied() {
        let enforcer = PolicyEnforcer::new(Role::User, "bob");
        assert_eq!(
            enforcer.enforce_machine_access("alice"),
            Err(EnforcementError::NotOwner {
                caller: "bob".to_string(),
                owner: "alice".to_string(),
            })
        );
    }

    #[test]
    fn admin_bypasses_ownership() {
        let enforcer = PolicyEnforcer::new(Role::Admin, "root");
        assert!(enforcer.enforce_machine_access("alice").is_ok());
    }
}
