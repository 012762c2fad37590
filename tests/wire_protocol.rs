//! Integration tests for JSON-RPC 2.0 wire handling.
//!
//! These tests verify the codec against frames as clients actually send
//! them: request/notification discrimination, id fidelity, and error
//! classification.

use mcp_session::rpc::{decode, encode, ErrorCode, Message, Request, RequestId};

// =============================================================================
// Frame Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = decode(json);
    assert!(result.is_ok());

    if let Message::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_tools_list_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/list",
        "params": {}
    }"#;

    let result = decode(json);
    assert!(result.is_ok());

    if let Message::Request(req) = result.unwrap() {
        assert_eq!(req.method, "tools/list");
        assert_eq!(req.id, RequestId::Number(2));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let result = decode(json);
    assert!(result.is_ok());

    if let Message::Notification(notif) = result.unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_invalid_json() {
    let result = decode("not valid json");
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().code(), ErrorCode::ParseError);
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    let result = decode(json);
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().code(), ErrorCode::InvalidRequest);
}

// =============================================================================
// Round-Trip Fidelity Tests
// =============================================================================

#[test]
fn test_round_trip_preserves_integer_id() {
    let message = Message::Request(Request::new(
        86,
        "tools/call",
        Some(serde_json::json!({"name": "FindLevel", "arguments": {"grade": 86}})),
    ));

    let decoded = decode(&encode(&message)).unwrap();
    assert_eq!(decoded, message);
    assert_eq!(decoded.id(), Some(&RequestId::Number(86)));
}

#[test]
fn test_round_trip_preserves_string_id() {
    let message = Message::Request(Request::new("req-86", "tools/call", None));

    let decoded = decode(&encode(&message)).unwrap();
    assert_eq!(decoded, message);
    assert_eq!(decoded.id(), Some(&RequestId::String("req-86".to_string())));
}

#[test]
fn test_integer_and_string_ids_stay_distinct() {
    let numeric = decode(r#"{"jsonrpc": "2.0", "id": 7, "method": "ping"}"#).unwrap();
    let stringy = decode(r#"{"jsonrpc": "2.0", "id": "7", "method": "ping"}"#).unwrap();

    assert_ne!(numeric.id(), stringy.id());
}
