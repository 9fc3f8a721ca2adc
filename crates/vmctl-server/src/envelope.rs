//! The `{responses: [{type, is_last, ...}]}` wire envelope every
//! `/api/v4` handler replies with.
//!
//! One logical response is a list of elements because a deploy status
//! check needs to say two things at once (the request's own state,
//! plus a capabilities snapshot); `type` tells the client which shape
//! to expect and `is_last` tells it when to stop polling.

use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::{json, Value};

/// One element of a `responses` array.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseElement {
    /// A newly created request's id, returned immediately so the
    /// caller can poll `GET /requests/{id}`.
    RequestId {
        request_id: String,
        is_last: bool,
        #[serde(rename = "type")]
        kind: &'static str,
    },
    /// A finished synchronous read, e.g. a machine or capabilities view.
    ReturnValue {
        result: Value,
        is_last: bool,
        #[serde(rename = "type")]
        kind: &'static str,
    },
    /// A value the caller should keep polling for, e.g. a screenshot
    /// still being captured.
    RetryUntilLast {
        result: Value,
        is_last: bool,
        #[serde(rename = "type")]
        kind: &'static str,
    },
}

impl ResponseElement {
    #[must_use]
    pub fn request_id(id: i64) -> Self {
        Self::RequestId {
            request_id: id.to_string(),
            is_last: false,
            kind: "request_id",
        }
    }

    #[must_use]
    pub fn return_value(result: Value, is_last: bool) -> Self {
        Self::ReturnValue {
            result,
            is_last,
            kind: "return_value",
        }
    }

    #[must_use]
    pub fn retry_until_last(result: Value, is_last: bool) -> Self {
        Self::RetryUntilLast {
            result,
            is_last,
            kind: "retry_until_last",
        }
    }
}

/// Wraps one or more [`ResponseElement`]s into the final `responses`
/// array body.
#[must_use]
pub fn envelope(elements: Vec<ResponseElement>) -> Response {
    Json(json!({ "responses": elements })).into_response()
}

/// Convenience for the common single-element case.
#[must_use]
pub fn single(element: ResponseElement) -> Response {
    envelope(vec![element])
}

/// Wraps pre-built `Value` elements, for handlers whose response shape
/// (e.g. the request-status endpoint's appended exception element)
/// doesn't fit [`ResponseElement`]'s three fixed shapes.
#[must_use]
pub fn raw(elements: Vec<Value>) -> Response {
    Json(json!({ "responses": elements })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_serializes_with_string_id_and_not_last() {
        let value = serde_json::to_value(ResponseElement::request_id(42)).unwrap();
        assert_eq!(value["type"], "request_id");
        assert_eq!(value["request_id"], "42");
        assert_eq!(value["is_last"], false);
    }

    #[test]
    fn return_value_carries_the_caller_supplied_is_last() {
        let value = serde_json::to_value(ResponseElement::return_value(json!({"a": 1}), true)).unwrap();
        assert_eq!(value["type"], "return_value");
        assert_eq!(value["result"]["a"], 1);
        assert_eq!(value["is_last"], true);
    }

    #[test]
    fn retry_until_last_uses_its_own_type_tag() {
        let value = serde_json::to_value(ResponseElement::retry_until_last(json!(null), false)).unwrap();
        assert_eq!(value["type"], "retry_until_last");
        assert_eq!(value["is_last"], false);
    }
}
