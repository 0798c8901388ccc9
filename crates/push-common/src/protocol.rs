//! Named-event framing over WebSocket text messages.
//!
//! Each frame is a JSON object `{"event": <name>, "data": <value>}`. A
//! client sends `connectData` or `token` exactly once as its first frame;
//! the relay answers with `authenticated`, periodic `rekey` events, and
//! application messages named by their namespaced identifier.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events a client may send to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// First authentication attempt carrying the signed handshake string.
    #[serde(rename = "connectData")]
    ConnectData(String),
    /// Reconnect attempt presenting a previously issued rekey token.
    #[serde(rename = "token")]
    Token(String),
}

impl ClientEvent {
    /// Parses a client frame. Unknown event names or malformed JSON fail
    /// the parse.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// A relay→client frame.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent<'a> {
    /// Event name: `authenticated`, `rekey`, or a message identifier.
    pub event: &'a str,
    /// Event payload, omitted from the wire when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl<'a> ServerEvent<'a> {
    /// The payload-less acknowledgement sent after a successful handshake.
    #[must_use]
    pub fn authenticated() -> ServerEvent<'static> {
        ServerEvent {
            event: "authenticated",
            data: None,
        }
    }

    /// A rekey event carrying a freshly minted reconnect token.
    #[must_use]
    pub fn rekey(token: &str) -> ServerEvent<'static> {
        ServerEvent {
            event: "rekey",
            data: Some(Value::String(token.to_owned())),
        }
    }

    /// An application message event.
    #[must_use]
    pub fn push(name: &'a str, payload: &Value) -> ServerEvent<'a> {
        ServerEvent {
            event: name,
            data: Some(payload.clone()),
        }
    }

    /// Serializes the frame to its wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("event frames always serialize")
    }
}
