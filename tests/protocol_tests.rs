//! Protocol Module Tests
//!
//! Unit tests and property-based tests for envelope construction and inbound
//! frame decoding.
//!
//! Property tests validate:
//! - Private method classification follows the `private/` namespace
//! - Subscription notifications decode to the channel and payload sent
//! - Responses decode to the id they carry, whatever else is in the frame

use deribit_ws_client::protocol::{
    self, AuthParams, HeartbeatKind, Incoming, Notification, PrivateSubscribe, PublicSubscribe,
    Request, RpcRequest, SetHeartbeat,
};
use proptest::prelude::*;
use serde_json::{json, Value};

#[test]
fn test_request_envelope_structure() {
    let params = json!({"instrument_name": "BTC-PERPETUAL", "depth": 5});
    let msg = serde_json::to_string(&RpcRequest::new(42, "public/get_order_book", &params)).unwrap();
    let parsed: Value = serde_json::from_str(&msg).unwrap();

    assert_eq!(parsed["jsonrpc"], "2.0");
    assert_eq!(parsed["id"], 42);
    assert_eq!(parsed["method"], "public/get_order_book");
    assert_eq!(parsed["params"], params);
    assert_eq!(parsed.as_object().unwrap().len(), 4);
}

#[test]
fn test_typed_request_methods() {
    assert_eq!(<AuthParams as Request>::METHOD, "public/auth");
    assert_eq!(PublicSubscribe::METHOD, "public/subscribe");
    assert_eq!(PrivateSubscribe::METHOD, "private/subscribe");
    assert_eq!(SetHeartbeat::METHOD, "public/set_heartbeat");
}

#[test]
fn test_subscribe_params_are_channel_list() {
    let params = serde_json::to_value(PublicSubscribe::new(vec!["a".into(), "b".into()])).unwrap();
    assert_eq!(params, json!({"channels": ["a", "b"]}));
}

#[test]
fn test_parse_heartbeat_kinds() {
    let hb = protocol::parse_message(r#"{"jsonrpc":"2.0","method":"heartbeat","params":{"type":"heartbeat"}}"#).unwrap();
    assert_eq!(hb, Incoming::Notification(Notification::Heartbeat(HeartbeatKind::Heartbeat)));
}

#[test]
fn test_parse_response_without_result() {
    let msg = protocol::parse_message(r#"{"jsonrpc":"2.0","id":9}"#).unwrap();
    assert_eq!(msg, Incoming::Response { id: 9, result: Ok(Value::Null) });
}

#[test]
fn test_parse_response_with_server_timestamps() {
    let msg = protocol::parse_message(
        r#"{"jsonrpc":"2.0","id":5,"result":"ok","usIn":1,"usOut":2,"usDiff":1,"testnet":true}"#,
    )
    .unwrap();
    assert_eq!(msg, Incoming::Response { id: 5, result: Ok(json!("ok")) });
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn channel_strategy() -> impl Strategy<Value = String> {
    "(user\\.)?[a-z]{3,8}\\.[A-Z]{3}-[A-Z]{4,9}\\.(raw|100ms)"
}

fn method_strategy() -> impl Strategy<Value = String> {
    "(public|private)/[a-z_]{3,20}"
}

proptest! {
    #[test]
    fn prop_private_methods_require_auth(method in method_strategy()) {
        prop_assert_eq!(protocol::requires_auth(&method), method.starts_with("private/"));
    }

    #[test]
    fn prop_subscription_notification_decodes(channel in channel_strategy(), n in any::<i64>()) {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "subscription",
            "params": {"channel": channel, "data": {"seq": n}}
        });
        match protocol::parse_message(&frame.to_string()).unwrap() {
            Incoming::Notification(Notification::Subscription(event)) => {
                prop_assert_eq!(event.channel, channel);
                prop_assert_eq!(event.data, json!({"seq": n}));
            }
            other => prop_assert!(false, "unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn prop_response_keeps_id(id in any::<u64>(), fail in any::<bool>()) {
        let frame = if fail {
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}})
        } else {
            json!({"jsonrpc": "2.0", "id": id, "result": {"ok": true}})
        };
        match protocol::parse_message(&frame.to_string()).unwrap() {
            Incoming::Response { id: got, result } => {
                prop_assert_eq!(got, id);
                prop_assert_eq!(result.is_err(), fail);
            }
            other => prop_assert!(false, "unexpected frame: {:?}", other),
        }
    }
}
