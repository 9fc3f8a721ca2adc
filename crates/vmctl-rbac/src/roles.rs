//! Role definitions for the authorization boundary.
//!
//! Two roles only: an `Admin` caller bypasses ownership checks
//! entirely, everyone else is a `User` whose access is scoped to the
//! machines they own.

use serde::{Deserialize, Serialize};

/// Role in the access control system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Standard user, scoped to machines they own.
    User,
    /// Full access, bypasses ownership checks.
    Admin,
}

impl Role {
    /// Parses the `X-Authorised-As` header value. Anything other than
    /// `"admin"` (case-insensitive) is treated as `User` — an absent or
    /// malformed header must never silently grant admin access.
    #[must_use]
    pub fn from_header_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_header_recognized_case_insensitively() {
        assert_eq!(Role::from_header_value("admin"), Role::Admin);
        assert_eq!(Role::from_header_value("Admin"), Role::Admin);
        assert_eq!(Role::from_header_value("ADMIN"), Role::Admin);
    }

    #[test]
    fn anything_else_defaults_to_user() {
        assert_eq!(Role::from_header_value("user"), Role::User);
        assert_eq!(Role::from_header_value(""), Role::User);
        assert_eq!(Role::from_header_value("administrator"), Role::User);
    }
}
