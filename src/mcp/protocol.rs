//! JSON-RPC 2.0 message types and the request validator.
//!
//! Every message exchanged with an MCP client is a single JSON-RPC 2.0
//! object. This module defines the typed envelopes (requests, notifications,
//! responses, errors), the protocol version set, and [`validate_message`],
//! which classifies a raw payload before any semantic handling takes place.
//!
//! The validator deliberately does not interpret `id`, `params`, or `method`
//! semantics beyond presence and type; that is the protocol engine's job.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol versions this server can negotiate.
///
/// Variant order matches the lexicographic order of the ISO-8601 date
/// strings, so the derived `Ord` is the single comparator for
/// version-dependent behaviour. New versions must be appended in date order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Streamable HTTP without structured tool output.
    #[serde(rename = "2025-03-26")]
    V2025_03_26,
    /// Adds `title`, `outputSchema`, and `structuredContent`, and requires
    /// the `MCP-Protocol-Version` header on HTTP requests.
    #[serde(rename = "2025-06-18")]
    V2025_06_18,
}

impl ProtocolVersion {
    /// Parses a version string offered by a client.
    ///
    /// Returns `None` for anything outside the supported set, including the
    /// recognised-but-unsupported `2024-11-05` (it requires SSE).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "2025-03-26" => Some(Self::V2025_03_26),
            "2025-06-18" => Some(Self::V2025_06_18),
            _ => None,
        }
    }

    /// The wire representation of this version.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V2025_03_26 => "2025-03-26",
            Self::V2025_06_18 => "2025-06-18",
        }
    }

    /// All versions this server supports, in ascending order.
    #[must_use]
    pub const fn supported() -> [&'static str; 2] {
        ["2025-03-26", "2025-06-18"]
    }

    /// Whether tool descriptors may carry `title`/`outputSchema` and call
    /// results may carry `structuredContent` under this version.
    #[must_use]
    pub const fn supports_structured_output(self) -> bool {
        matches!(self, Self::V2025_06_18)
    }

    /// Whether HTTP requests must carry a matching `MCP-Protocol-Version`
    /// header under this version.
    #[must_use]
    pub const fn requires_version_header(self) -> bool {
        matches!(self, Self::V2025_06_18)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-RPC request identifier.
///
/// JSON-RPC 2.0 allows numbers and strings; the server echoes whichever
/// form the client used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier.
    Number(i64),
    /// String identifier.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A JSON-RPC request (a message carrying an `id`).
#[derive(Debug, Clone)]
pub struct JsonRpcRequest {
    /// Request identifier, echoed in the response.
    pub id: RequestId,
    /// Method name, e.g. `tools/call`.
    pub method: String,
    /// Parameters object, if supplied.
    pub params: Option<Map<String, Value>>,
}

/// A JSON-RPC notification (a message without an `id`).
#[derive(Debug, Clone)]
pub struct JsonRpcNotification {
    /// Method name, e.g. `notifications/initialized`.
    pub method: String,
    /// Parameters object, if supplied.
    pub params: Option<Map<String, Value>>,
}

/// A validated incoming message.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A notification expecting no response.
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// The method name of the message.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Request(req) => &req.method,
            Self::Notification(notif) => &notif.method,
        }
    }
}

/// A successful JSON-RPC response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Identifier of the request being answered.
    pub id: RequestId,
    /// Result payload.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a successful response for the given request id.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// Error codes used by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// `-32600` — the message violates the JSON-RPC 2.0 shape or a
    /// lifecycle rule.
    InvalidRequest,
    /// `-32601` — the method is not part of the MCP method set.
    MethodNotFound,
    /// `-32602` — the params are missing or unusable.
    InvalidParams,
}

impl ErrorCode {
    /// The numeric wire value.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
        }
    }
}

/// The `error` member of a JSON-RPC error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Diagnostic payload; an empty object when unused.
    pub data: Value,
}

impl JsonRpcErrorData {
    /// Creates error data with an empty diagnostic payload.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: json!({}),
        }
    }

    /// Creates error data carrying a diagnostic payload.
    #[must_use]
    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data,
        }
    }
}

/// A JSON-RPC error response.
///
/// `id` serialises as `null` when the failing request's id is unknown
/// (unparseable or malformed input).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Identifier of the failing request, or `null`.
    pub id: Option<RequestId>,
    /// Error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates an error response.
    #[must_use]
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error,
        }
    }

    /// Creates an invalid-request (`-32600`) error.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, message),
        )
    }

    /// Creates a method-not-found (`-32601`) error.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Creates an invalid-params (`-32602`) error.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }
}

/// Server identity advertised in the initialize result.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name, from configuration.
    pub name: String,
    /// Server version, from configuration.
    pub version: String,
}

/// Tool-related capabilities.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCapabilities {
    /// Always `false`; this server never emits list-changed notifications.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Capabilities advertised in the initialize result.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool capabilities.
    pub tools: ToolCapabilities,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: ToolCapabilities {
                list_changed: false,
            },
        }
    }
}

/// Result payload of a successful `initialize` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// The negotiated protocol version.
    pub protocol_version: ProtocolVersion,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
    /// Server identity.
    pub server_info: ServerInfo,
}

/// Outcome of validating one raw payload.
#[derive(Debug, Clone)]
pub enum Validation {
    /// The payload is not valid JSON.
    Unparseable,
    /// The payload is valid JSON but not a well-formed JSON-RPC 2.0 message.
    Malformed {
        /// Description of the violation.
        message: String,
    },
    /// The payload decoded into a request or notification.
    WellFormed(IncomingMessage),
}

/// Validates a single raw JSON-RPC 2.0 payload.
///
/// A message is well-formed when it is a JSON object with `jsonrpc: "2.0"`,
/// a non-empty string `method`, an optional object `params`, and an optional
/// string-or-number `id`. Presence of `id` makes it a request; absence makes
/// it a notification.
#[must_use]
pub fn validate_message(payload: &str) -> Validation {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return Validation::Unparseable;
    };

    let Value::Object(mut object) = value else {
        return Validation::Malformed {
            message: "Message must be a JSON object".to_string(),
        };
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Validation::Malformed {
            message: "Missing or invalid jsonrpc version".to_string(),
        };
    }

    let method = match object.get("method").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => {
            return Validation::Malformed {
                message: "Missing or empty method".to_string(),
            }
        }
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            return Validation::Malformed {
                message: "params must be an object".to_string(),
            }
        }
    };

    let id = match object.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(RequestId::Number(i)),
            None => {
                return Validation::Malformed {
                    message: "id must be an integer or a string".to_string(),
                }
            }
        },
        Some(Value::String(s)) => Some(RequestId::String(s)),
        Some(_) => {
            return Validation::Malformed {
                message: "id must be an integer or a string".to_string(),
            }
        }
    };

    let message = match id {
        Some(id) => IncomingMessage::Request(JsonRpcRequest { id, method, params }),
        None => IncomingMessage::Notification(JsonRpcNotification { method, params }),
    };

    Validation::WellFormed(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering_matches_dates() {
        assert!(ProtocolVersion::V2025_03_26 < ProtocolVersion::V2025_06_18);
        assert!(!ProtocolVersion::V2025_03_26.supports_structured_output());
        assert!(ProtocolVersion::V2025_06_18.supports_structured_output());
    }

    #[test]
    fn version_parse_rejects_sse_era() {
        assert!(ProtocolVersion::parse("2024-11-05").is_none());
        assert!(ProtocolVersion::parse("1.0.0").is_none());
        assert_eq!(
            ProtocolVersion::parse("2025-06-18"),
            Some(ProtocolVersion::V2025_06_18)
        );
    }

    #[test]
    fn version_serde_round_trip() {
        let version = ProtocolVersion::V2025_03_26;
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"2025-03-26\"");

        let back: ProtocolVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, version);
    }

    #[test]
    fn validate_request_with_numeric_id() {
        let payload = r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#;
        match validate_message(payload) {
            Validation::WellFormed(IncomingMessage::Request(req)) => {
                assert_eq!(req.id, RequestId::Number(7));
                assert_eq!(req.method, "ping");
                assert!(req.params.is_none());
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn validate_notification_has_no_id() {
        let payload = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        match validate_message(payload) {
            Validation::WellFormed(IncomingMessage::Notification(notif)) => {
                assert_eq!(notif.method, "notifications/initialized");
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_bad_json() {
        assert!(matches!(
            validate_message("not json at all"),
            Validation::Unparseable
        ));
    }

    #[test]
    fn validate_rejects_wrong_jsonrpc_version() {
        let payload = r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#;
        assert!(matches!(
            validate_message(payload),
            Validation::Malformed { .. }
        ));
    }

    #[test]
    fn validate_rejects_non_object_params() {
        let payload = r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":[1,2]}"#;
        assert!(matches!(
            validate_message(payload),
            Validation::Malformed { .. }
        ));
    }

    #[test]
    fn validate_rejects_empty_method() {
        let payload = r#"{"jsonrpc":"2.0","id":1,"method":""}"#;
        assert!(matches!(
            validate_message(payload),
            Validation::Malformed { .. }
        ));
    }

    #[test]
    fn error_data_defaults_to_empty_object() {
        let error = JsonRpcError::invalid_request(None, "bad");
        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(json["error"]["code"], -32600);
        assert_eq!(json["error"]["data"], json!({}));
        assert!(json["id"].is_null());
    }

    #[test]
    fn string_ids_are_preserved() {
        let response = JsonRpcResponse::success(RequestId::String("p".to_string()), json!({}));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["id"], "p");
        assert_eq!(json["jsonrpc"], "2.0");
    }
}
