//! Core wire types: the JSON-RPC 2.0 envelope and tri-state health flags.
//!
//! # Type Categories
//!
//! ## JSON-RPC Protocol Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: protocol conformance
//!
//! ## Health Types
//! - [`TriState`]: explicit three-value flag for `online` / `authenticated`, so the
//!   probe transition table stays exhaustive instead of hiding a third state in a
//!   nullable boolean.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version - zero allocation for static usage.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Fixed URL path that JSON-RPC enveloped calls are POSTed to.
pub const JSON_RPC_PATH: &str = "json_rpc";

/// JSON-RPC 2.0 request structure.
///
/// The `id` is a generated UUID string so concurrent requests over the same
/// endpoint never collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with a generated id and zero allocation
    /// for the version string.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            id: uuid::Uuid::new_v4().to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response structure.
///
/// A response contains either a `result` (success) or an `error` (failure).
/// All fields are optional at the serde level so that malformed envelopes
/// deserialize into something the transport can inspect and reject with a
/// precise error instead of a generic parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 error object.
///
/// Standard error codes follow the JSON-RPC 2.0 convention:
/// `-32700` parse error, `-32600` invalid request, `-32601` method not found,
/// `-32602` invalid params, `-32603` internal error, `-32000..=-32099`
/// server-defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Three-valued flag used for endpoint health state.
///
/// `Unknown` is the initial state before any probe has run, and the state
/// `authenticated` falls back to whenever the endpoint is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriState {
    #[default]
    Unknown,
    True,
    False,
}

impl TriState {
    #[must_use]
    pub fn is_true(self) -> bool {
        self == Self::True
    }

    #[must_use]
    pub fn is_false(self) -> bool {
        self == Self::False
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// Checks the `"status"` field convention used by path-style responses.
///
/// A missing, empty, or `"OK"` status signals success. The transport never
/// interprets this field itself; callers of path requests apply this check.
#[must_use]
pub fn path_status_ok(body: &serde_json::Value) -> bool {
    match body.get("status").and_then(|s| s.as_str()) {
        None | Some("" | "OK") => true,
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest::new("get_version", None);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "get_version");
        assert!(value.get("params").is_none(), "absent params must be omitted");
        assert!(!value["id"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = JsonRpcRequest::new("get_version", None);
        let b = JsonRpcRequest::new("get_version", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_response_with_error() {
        let raw = r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":"1"}"#;
        let response: JsonRpcResponse = serde_json::from_str(raw).unwrap();

        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found");
    }

    #[test]
    fn test_response_missing_fields_deserialize() {
        let response: JsonRpcResponse = serde_json::from_str("{}").unwrap();
        assert!(response.result.is_none());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_tri_state_default_is_unknown() {
        assert_eq!(TriState::default(), TriState::Unknown);
        assert!(!TriState::Unknown.is_true());
        assert!(!TriState::Unknown.is_false());
    }

    #[test]
    fn test_tri_state_from_bool() {
        assert_eq!(TriState::from(true), TriState::True);
        assert_eq!(TriState::from(false), TriState::False);
    }

    #[test]
    fn test_path_status_ok() {
        assert!(path_status_ok(&json!({"status": "OK", "height": 100})));
        assert!(path_status_ok(&json!({"status": ""})));
        assert!(path_status_ok(&json!({"height": 100})));
        assert!(!path_status_ok(&json!({"status": "BUSY"})));
        assert!(!path_status_ok(&json!({"status": "Failed"})));
    }
}
