//! WebSocket message types.
//!
//! Defines the generic message envelope format used for all WebSocket
//! communication. Feature-specific payloads are carried as JSON values.

use serde::{Deserialize, Serialize};

/// Server -> Client message envelope.
///
/// All messages from server to client use this format. The `msg_type`
/// field is used for routing (e.g., "connected", "vote_update").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub payload: serde_json::Value,
}

impl ServerMessage {
    pub fn new(msg_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Create a server message with a null payload.
    pub fn empty(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::Value::Null,
        }
    }
}

/// Client -> Server message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// System-level messages used by the WebSocket infrastructure itself.
pub mod system {
    use serde::{Deserialize, Serialize};

    /// Sent immediately after the connection is established.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Connected {
        pub connection_id: usize,
        pub server_version: String,
    }

    /// Heartbeat request (client -> server). Server responds with `Pong`.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Ping;

    /// Heartbeat response (server -> client).
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Pong;

    /// Sent when the server cannot process a client message.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Error {
        pub code: String,
        pub message: String,
    }

    impl Error {
        pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
            Self {
                code: code.into(),
                message: message.into(),
            }
        }
    }
}

/// Reserved message type constants.
pub mod msg_types {
    /// Sent by server on successful connection.
    pub const CONNECTED: &str = "connected";
    /// Client heartbeat request.
    pub const PING: &str = "ping";
    /// Server heartbeat response.
    pub const PONG: &str = "pong";
    /// Server error response.
    pub const ERROR: &str = "error";
    /// Client asks to follow a show topic.
    pub const SUBSCRIBE: &str = "subscribe";
    /// Client asks to leave a show topic.
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    /// Server confirms a subscription.
    pub const SUBSCRIBED: &str = "subscribed";
    /// Server confirms an unsubscription.
    pub const UNSUBSCRIBED: &str = "unsubscribed";
    /// Live tally update for a show the client follows.
    pub const VOTE_UPDATE: &str = "vote_update";
}

/// Topic subscription payloads.
pub mod topics {
    use serde::{Deserialize, Serialize};

    /// Payload of subscribe and unsubscribe requests.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct TopicRequest {
        pub show_id: String,
    }

    /// Payload of subscribed and unsubscribed confirmations.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct TopicAck {
        pub show_id: String,
    }
}
