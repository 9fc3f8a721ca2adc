//! Server error types and their translation into the `/api/v4`
//! `responses: [{type: "exception", ...}]` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by the HTTP Intake.
///
/// Every variant maps to a single `exception` response element —
/// never persisted, never retried, always `is_last: true` per the
/// propagation policy validation errors follow.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Document store or connection manager error.
    #[error("database error: {0}")]
    Store(#[from] vmctl_store::StoreError),

    /// Caller is neither the resource owner nor an admin.
    #[error(transparent)]
    Forbidden(#[from] vmctl_rbac::EnforcementError),

    /// Malformed request body or query parameters.
    #[error("{0}")]
    InvalidUsage(String),

    /// Referenced machine, request, snapshot or host does not exist.
    #[error("specified resource cannot be obtained")]
    NotFound,

    /// Deploy intake rejected because the Capabilities Cache reports
    /// no free slot.
    #[error("unit is currently full and cannot process any new machine at the moment")]
    NoFreeSlots,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidUsage(_) | Self::NoFreeSlots => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
        };
        let body = json!({
            "responses": [{
                "type": "exception",
                "exception": self.to_string(),
                "is_last": true,
            }]
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(ServerError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn no_free_slots_maps_to_400_not_503() {
        // A full unit is an expected, client-actionable condition (retry
        // later), not a server fault.
        assert_eq!(ServerError::NoFreeSlots.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn forbidden_maps_to_403() {
        let err = ServerError::Forbidden(vmctl_rbac::EnforcementError::NotOwner {
            caller: "bob".to_string(),
            owner: "alice".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }
}
