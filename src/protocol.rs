//! Protocol Module
//!
//! JSON-RPC 2.0 envelopes exchanged with the venue, the typed requests the
//! client core issues itself, and decoding of inbound frames.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace prefix of methods that need an access token
pub const PRIVATE_METHOD_PREFIX: &str = "private/";

/// Name prefix of channels that can only be subscribed with an access token
pub const PRIVATE_CHANNEL_PREFIX: &str = "user.";

// ============================================================================
// Outgoing Message Types
// ============================================================================

/// Request envelope
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: &'a Value,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// A typed venue method.
///
/// Whether a method needs authentication is fixed by its namespace, so the
/// classification is known from the type alone.
pub trait Request: Serialize {
    const METHOD: &'static str;
    type Response: DeserializeOwned;
}

/// Whether `method` is gated behind a prior successful `public/auth`
pub fn requires_auth(method: &str) -> bool {
    method.starts_with(PRIVATE_METHOD_PREFIX)
}

/// `public/auth` parameters
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
pub enum AuthParams {
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    RefreshToken {
        refresh_token: String,
    },
}

impl Request for AuthParams {
    const METHOD: &'static str = "public/auth";
    type Response = AuthResult;
}

/// `public/auth` result
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResult {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_type: String,
}

/// Channel list shared by the subscribe and unsubscribe methods
#[derive(Debug, Clone, Serialize)]
pub struct ChannelsParams {
    pub channels: Vec<String>,
}

macro_rules! channel_request {
    ($name:ident, $method:literal) => {
        #[derive(Debug, Clone, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub ChannelsParams);

        impl $name {
            pub fn new(channels: Vec<String>) -> Self {
                Self(ChannelsParams { channels })
            }
        }

        impl Request for $name {
            const METHOD: &'static str = $method;
            /// The venue answers with the list of channels it accepted
            type Response = Vec<String>;
        }
    };
}

channel_request!(PublicSubscribe, "public/subscribe");
channel_request!(PrivateSubscribe, "private/subscribe");
channel_request!(PublicUnsubscribe, "public/unsubscribe");
channel_request!(PrivateUnsubscribe, "private/unsubscribe");

/// `public/set_heartbeat` parameters; interval in seconds
#[derive(Debug, Clone, Serialize)]
pub struct SetHeartbeat {
    pub interval: u64,
}

impl Request for SetHeartbeat {
    const METHOD: &'static str = "public/set_heartbeat";
    type Response = String;
}

/// `public/test`, also the answer to a heartbeat `test_request`
#[derive(Debug, Clone, Default, Serialize)]
pub struct Test {}

impl Request for Test {
    const METHOD: &'static str = "public/test";
    type Response = Value;
}

// ============================================================================
// Incoming Message Types
// ============================================================================

/// Error object carried by a failed response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Push notification payload for the `subscription` method
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Event {
    pub channel: String,
    pub data: Value,
}

impl Event {
    /// Decode the opaque payload into a concrete type
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Kind of venue heartbeat notification
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatKind {
    Heartbeat,
    TestRequest,
}

#[derive(Debug, Clone, Deserialize)]
struct HeartbeatParams {
    #[serde(rename = "type")]
    kind: HeartbeatKind,
}

/// Notification methods understood by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMethod {
    Subscription,
    Heartbeat,
}

impl NotificationMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "subscription" => Some(Self::Subscription),
            "heartbeat" => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// Unsolicited server-to-client message
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Subscription(Event),
    Heartbeat(HeartbeatKind),
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response {
        id: u64,
        result: Result<Value, RpcError>,
    },
    Notification(Notification),
    /// Notification with a method tag the client does not know
    Unknown(String),
}

/// Only the fields needed to decide what a frame is
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Parse an inbound text frame
pub fn parse_message(json: &str) -> Result<Incoming, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(json)?;

    if let Some(id) = envelope.id {
        let result = match envelope.error {
            Some(error) => Err(error),
            None => Ok(envelope.result.unwrap_or(Value::Null)),
        };
        return Ok(Incoming::Response { id, result });
    }

    let Some(name) = envelope.method else {
        return Err(serde::de::Error::custom("frame has neither id nor method"));
    };
    let params = envelope.params.unwrap_or(Value::Null);

    match NotificationMethod::from_name(&name) {
        Some(NotificationMethod::Subscription) => {
            let event = Event::deserialize(params)?;
            Ok(Incoming::Notification(Notification::Subscription(event)))
        }
        Some(NotificationMethod::Heartbeat) => {
            let heartbeat = HeartbeatParams::deserialize(params)?;
            Ok(Incoming::Notification(Notification::Heartbeat(heartbeat.kind)))
        }
        None => Ok(Incoming::Unknown(name)),
    }
}
