//! Caller identity extraction from request headers.
//!
//! The system this was modeled on reads `AUTHORISED_LOGIN` and
//! `AUTHORISED_AS` off the request (populated upstream by an LDAP or
//! reverse-proxy auth layer the HTTP Intake itself never implements).
//! This crate keeps that same contract: a header-based
//! [`Authenticator`] trait with a direct-header implementation, never
//! an identity provider of its own.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use vmctl_rbac::Role;

/// Header carrying the caller's login, used both for auditing and
/// (when `personalised=true`) to tag new machines with an owner.
pub const LOGIN_HEADER: &str = "x-authorised-login";

/// Header carrying `admin` or anything else; parsed via
/// [`Role::from_header_value`].
pub const ROLE_HEADER: &str = "x-authorised-as";

/// The authenticated caller of one HTTP request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub login: String,
    pub role: Role,
}

impl Caller {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let login = parts
            .headers
            .get(LOGIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("Not specified")
            .to_string();
        let role = parts
            .headers
            .get(ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Role::from_header_value)
            .unwrap_or(Role::User);
        Ok(Self { login, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Caller {
        let (mut parts, ()) = req.into_parts();
        Caller::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn missing_headers_default_to_unspecified_user() {
        let req = Request::builder().body(()).unwrap();
        let caller = extract(req).await;
        assert_eq!(caller.login, "Not specified");
        assert!(!caller.is_admin());
    }

    #[tokio::test]
    async fn admin_header_is_case_insensitive() {
        let req = Request::builder()
            .header(LOGIN_HEADER, "alice")
            .header(ROLE_HEADER, "Admin")
            .body(())
            .unwrap();
        let caller = extract(req).await;
        assert_eq!(caller.login, "alice");
        assert!(caller.is_admin());
    }
}
