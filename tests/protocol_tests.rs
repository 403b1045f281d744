//! Integration tests for JSON-RPC message validation.
//!
//! These tests verify the request validator's classification of raw
//! payloads and the wire shape of responses and errors.

use serde_json::json;

use toolgate_mcp::mcp::protocol::{
    validate_message, IncomingMessage, JsonRpcError, JsonRpcResponse, ProtocolVersion, RequestId,
    Validation,
};

// =============================================================================
// Validator Classification Tests
// =============================================================================

#[test]
fn test_validate_initialize_request() {
    let payload = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let Validation::WellFormed(IncomingMessage::Request(req)) = validate_message(payload) else {
        panic!("Expected a well-formed request");
    };

    assert_eq!(req.method, "initialize");
    assert_eq!(req.id, RequestId::Number(1));
    assert!(req.params.is_some());
}

#[test]
fn test_validate_request_without_params() {
    let payload = r#"{"jsonrpc": "2.0", "id": 2, "method": "tools/list"}"#;

    let Validation::WellFormed(IncomingMessage::Request(req)) = validate_message(payload) else {
        panic!("Expected a well-formed request");
    };

    assert_eq!(req.method, "tools/list");
    assert!(req.params.is_none());
}

#[test]
fn test_validate_notification() {
    let payload = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;

    let Validation::WellFormed(IncomingMessage::Notification(notif)) = validate_message(payload)
    else {
        panic!("Expected a well-formed notification");
    };

    assert_eq!(notif.method, "notifications/initialized");
}

#[test]
fn test_validate_string_id() {
    let payload = r#"{"jsonrpc": "2.0", "id": "p", "method": "ping"}"#;

    let Validation::WellFormed(IncomingMessage::Request(req)) = validate_message(payload) else {
        panic!("Expected a well-formed request");
    };

    assert_eq!(req.id, RequestId::String("p".to_string()));
}

#[test]
fn test_invalid_json_is_unparseable() {
    assert!(matches!(
        validate_message("not valid json"),
        Validation::Unparseable
    ));
    assert!(matches!(validate_message(""), Validation::Unparseable));
    assert!(matches!(
        validate_message("{\"jsonrpc\": \"2.0\","),
        Validation::Unparseable
    ));
}

#[test]
fn test_non_object_is_malformed() {
    assert!(matches!(
        validate_message("[1, 2, 3]"),
        Validation::Malformed { .. }
    ));
    assert!(matches!(
        validate_message("\"hello\""),
        Validation::Malformed { .. }
    ));
}

#[test]
fn test_missing_jsonrpc_version_is_malformed() {
    let payload = r#"{"id": 1, "method": "ping"}"#;
    assert!(matches!(
        validate_message(payload),
        Validation::Malformed { .. }
    ));
}

#[test]
fn test_wrong_jsonrpc_version_is_malformed() {
    let payload = r#"{"jsonrpc": "1.0", "id": 1, "method": "ping"}"#;
    assert!(matches!(
        validate_message(payload),
        Validation::Malformed { .. }
    ));
}

#[test]
fn test_missing_method_is_malformed() {
    let payload = r#"{"jsonrpc": "2.0", "id": 1}"#;
    assert!(matches!(
        validate_message(payload),
        Validation::Malformed { .. }
    ));
}

#[test]
fn test_array_params_is_malformed() {
    let payload = r#"{"jsonrpc": "2.0", "id": 1, "method": "ping", "params": [1]}"#;
    assert!(matches!(
        validate_message(payload),
        Validation::Malformed { .. }
    ));
}

// =============================================================================
// Envelope Shape Tests
// =============================================================================

#[test]
fn test_response_echoes_request_id() {
    let response = JsonRpcResponse::success(RequestId::Number(42), json!({"ok": true}));
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["jsonrpc"], "2.0");
    assert_eq!(value["id"], 42);
    assert_eq!(value["result"]["ok"], true);
}

#[test]
fn test_error_with_unknown_id_serialises_null() {
    let error = JsonRpcError::invalid_request(None, "broken");
    let value = serde_json::to_value(&error).unwrap();

    assert_eq!(value["jsonrpc"], "2.0");
    assert!(value["id"].is_null());
    assert_eq!(value["error"]["code"], -32600);
    assert_eq!(value["error"]["message"], "broken");
    assert_eq!(value["error"]["data"], json!({}));
}

#[test]
fn test_error_codes_cover_the_method_set() {
    let not_found = JsonRpcError::method_not_found(RequestId::Number(1), "resources/list");
    assert_eq!(not_found.error.code, -32601);
    assert!(not_found.error.message.contains("resources/list"));

    let bad_params = JsonRpcError::invalid_params(RequestId::Number(2), "Missing tool name");
    assert_eq!(bad_params.error.code, -32602);
}

// =============================================================================
// Protocol Version Tests
// =============================================================================

#[test]
fn test_supported_versions_are_ordered() {
    let supported = ProtocolVersion::supported();
    assert_eq!(supported, ["2025-03-26", "2025-06-18"]);

    let mut sorted = supported;
    sorted.sort_unstable();
    assert_eq!(sorted, supported, "supported set must stay in date order");
}

#[test]
fn test_version_gates_structured_output() {
    let old = ProtocolVersion::parse("2025-03-26").unwrap();
    let new = ProtocolVersion::parse("2025-06-18").unwrap();

    assert!(old < new);
    assert!(!old.supports_structured_output());
    assert!(!old.requires_version_header());
    assert!(new.supports_structured_output());
    assert!(new.requires_version_header());
}
