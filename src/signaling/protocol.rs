//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object with a `type` discriminator, except
//! directed relay messages, which carry arbitrary client-defined fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{PeerId, PeerInfo};

/// Field naming the recipient of a directed message.
pub const TO_FIELD: &str = "to";

/// Field naming the origin of a relayed message.
pub const SENDER_FIELD: &str = "sender";

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages received from clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Directed message for another peer in the same room.
    Relay {
        /// Recipient.
        to: PeerId,
        /// Every field of the original message except `to`.
        payload: Map<String, Value>,
    },

    /// Reply to a keepalive ping.
    Pong,

    /// Client is leaving voluntarily.
    Disconnect,

    /// Well-formed but not understood by this server version.
    Unknown,
}

impl ClientMessage {
    /// Parse an inbound frame.
    ///
    /// Returns `None` for anything that is not a JSON object. A `to` field
    /// takes precedence over `type`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(bytes).ok()?;
        let Value::Object(mut fields) = value else {
            return None;
        };

        if let Some(to) = fields.remove(TO_FIELD) {
            return Some(match to {
                Value::String(to) => ClientMessage::Relay {
                    to: PeerId::from(to.as_str()),
                    payload: fields,
                },
                _ => ClientMessage::Unknown,
            });
        }

        Some(match fields.get("type").and_then(Value::as_str) {
            Some("pong") => ClientMessage::Pong,
            Some("disconnect") => ClientMessage::Disconnect,
            _ => ClientMessage::Unknown,
        })
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages generated by the server itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Roster of the room at join time (excluding the recipient).
    Peers {
        /// Existing members in join order.
        peers: Vec<PeerInfo>,
    },

    /// The recipient's own names, sent once after registration.
    #[serde(rename_all = "camelCase")]
    DisplayName {
        /// Name derived from the peer identity.
        display_name: String,
        /// Name derived from the device.
        device_name: String,
    },

    /// Another peer joined the room.
    PeerJoined {
        /// The new peer.
        peer: PeerInfo,
    },

    /// A peer left the room.
    #[serde(rename_all = "camelCase")]
    PeerLeft {
        /// The departed peer.
        peer_id: PeerId,
    },

    /// Keepalive ping.
    Ping,
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A directed message as delivered to its recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RelayedMessage(Map<String, Value>);

impl RelayedMessage {
    /// Stamp a payload with its sender. A client-supplied `sender` is overwritten.
    pub fn new(sender: &PeerId, mut payload: Map<String, Value>) -> Self {
        payload.remove(TO_FIELD);
        payload.insert(
            SENDER_FIELD.to_string(),
            Value::String(sender.as_str().to_string()),
        );
        Self(payload)
    }

    /// Sender of the message.
    pub fn sender(&self) -> Option<&str> {
        self.0.get(SENDER_FIELD).and_then(Value::as_str)
    }

    /// Look up a payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Anything queued for delivery to a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// Server-generated event.
    Server(ServerMessage),
    /// Directed message from another peer.
    Relay(RelayedMessage),
}

impl OutboundMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<ServerMessage> for OutboundMessage {
    fn from(msg: ServerMessage) -> Self {
        OutboundMessage::Server(msg)
    }
}

impl From<RelayedMessage> for OutboundMessage {
    fn from(msg: RelayedMessage) -> Self {
        OutboundMessage::Relay(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Capabilities, DeviceInfo};
    use serde_json::json;

    fn sample_info() -> PeerInfo {
        PeerInfo::new(
            PeerId::from("67e55044-10b1-426f-9247-bb680e5fe0c8"),
            DeviceInfo::default(),
            Capabilities { rtc_supported: true },
        )
    }

    #[test]
    fn test_parse_relay_strips_to() {
        let msg = ClientMessage::parse(br#"{"to":"abc","type":"signal","sdp":"x"}"#).unwrap();
        match msg {
            ClientMessage::Relay { to, payload } => {
                assert_eq!(to, PeerId::from("abc"));
                assert!(!payload.contains_key("to"));
                assert_eq!(payload["type"], "signal");
                assert_eq!(payload["sdp"], "x");
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(ClientMessage::parse(br#"{"type":"pong"}"#), Some(ClientMessage::Pong));
        assert_eq!(
            ClientMessage::parse(br#"{"type":"disconnect"}"#),
            Some(ClientMessage::Disconnect)
        );
        assert_eq!(
            ClientMessage::parse(br#"{"type":"future-feature","x":1}"#),
            Some(ClientMessage::Unknown)
        );
        assert_eq!(ClientMessage::parse(br#"{"to":42}"#), Some(ClientMessage::Unknown));
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert_eq!(ClientMessage::parse(b"not json"), None);
        assert_eq!(ClientMessage::parse(b"[1,2,3]"), None);
        assert_eq!(ClientMessage::parse(b"\"to\""), None);
        assert_eq!(ClientMessage::parse(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_server_message_tags() {
        let json = ServerMessage::Peers { peers: vec![sample_info()] }.to_json().unwrap();
        assert!(json.contains(r#""type":"peers""#));

        let json = ServerMessage::PeerLeft { peer_id: PeerId::from("abc") }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"peer-left","peerId":"abc"}"#);

        let json = ServerMessage::Ping.to_json().unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_display_name_fields() {
        let msg = ServerMessage::DisplayName {
            display_name: "Teal Otter".into(),
            device_name: "Mac Safari".into(),
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "display-name", "displayName": "Teal Otter", "deviceName": "Mac Safari"})
        );
    }

    #[test]
    fn test_peer_joined_parses_back() {
        let msg = ServerMessage::PeerJoined { peer: sample_info() };
        let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_relayed_message_overwrites_sender() {
        let Value::Object(payload) = json!({"to": "b", "sender": "spoofed", "msg": "hi"}) else {
            unreachable!()
        };
        let relayed = RelayedMessage::new(&PeerId::from("a"), payload);

        let json = OutboundMessage::from(relayed.clone()).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, json!({"sender": "a", "msg": "hi"}));
        assert_eq!(relayed.sender(), Some("a"));
    }
}
