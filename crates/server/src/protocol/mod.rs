//! Wire protocol for the WebSocket transport
//!
//! Frames are JSON text messages tagged on `"type"`. Timestamps travel as
//! epoch milliseconds. Frames that fail to parse are dropped by the
//! connection handler; they never close the connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Inbound frame from a client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Binds the sending connection to the identity in `from`.
    Register { from: String },
    /// Asks the relay to route a message.
    SendMessage {
        from: String,
        to: String,
        text: String,
        /// Client clock. Accepted for compatibility, never used for ordering.
        #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
        timestamp: Option<DateTime<Utc>>,
    },
}

/// Outbound frame pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A routed message, pushed to the recipient's live connection.
    Message {
        id: String,
        from: String,
        to: String,
        text: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    /// Persistence acknowledgment to the sender. Acknowledges the append,
    /// not delivery.
    MessageAccepted {
        id: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    /// Presence change, fanned out to every live connection.
    Presence {
        identity: String,
        online: bool,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
}

impl ServerFrame {
    /// Build a `message` frame from a logged message.
    pub fn message(message: &Message) -> Self {
        ServerFrame::Message {
            id: message.id.clone(),
            from: message.from.clone(),
            to: message.to.clone(),
            text: message.text.clone(),
            timestamp: message.timestamp,
        }
    }

    /// Build a `message_accepted` frame for a logged message.
    pub fn accepted(message: &Message) -> Self {
        ServerFrame::MessageAccepted {
            id: message.id.clone(),
            timestamp: message.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_register_frame() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"register","from":"alice"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Register {
                from: "alice".to_string()
            }
        );
    }

    #[test]
    fn parses_send_message_with_client_timestamp() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"send_message","from":"alice","to":"bob","text":"hi","timestamp":1700000000000}"#,
        )
        .unwrap();
        match frame {
            ClientFrame::SendMessage {
                from,
                to,
                text,
                timestamp,
            } => {
                assert_eq!(from, "alice");
                assert_eq!(to, "bob");
                assert_eq!(text, "hi");
                assert!(timestamp.is_some());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn parses_send_message_without_client_timestamp() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"send_message","from":"alice","to":"bob","text":"hi"}"#,
        )
        .unwrap();
        assert!(matches!(
            frame,
            ClientFrame::SendMessage {
                timestamp: None,
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_and_incomplete_frames() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"typing","from":"alice"}"#).is_err());
        assert!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"send_message","from":"alice"}"#)
                .is_err()
        );
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
    }

    #[test]
    fn serializes_presence_frame_tag_and_fields() {
        let frame = ServerFrame::Presence {
            identity: "alice".to_string(),
            online: true,
            timestamp: Utc::now(),
        };
        let json: serde_json::Value =
            serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "presence");
        assert_eq!(json["identity"], "alice");
        assert_eq!(json["online"], true);
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn serializes_message_accepted_tag() {
        let frame = ServerFrame::MessageAccepted {
            id: "m1".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"message_accepted""#));
    }
}
