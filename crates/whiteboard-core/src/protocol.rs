//! Wire protocol for the whiteboard relay.
//!
//! Messages are JSON, one per WebSocket text frame, tagged by a `type` field:
//!
//! ```json
//! { "type": "join_session", "session_id": "room1", "username": "Alice" }
//! { "type": "drawing", "x": 1, "y": 2 }
//! { "type": "save_canvas", "canvas_state": { ... } }
//! ```
//!
//! Drawing, object and cursor events carry an open set of fields that the
//! server relays without interpreting. The relay only injects the reserved
//! keys `user_id` and `username` to identify the sender.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open key/value payload relayed verbatim between clients.
pub type Payload = serde_json::Map<String, Value>;

/// Reserved payload key for the sender's user id.
pub const KEY_USER_ID: &str = "user_id";
/// Reserved payload key for the sender's display name.
pub const KEY_USERNAME: &str = "username";

fn default_session() -> String {
    "default".to_string()
}

fn default_username() -> String {
    "Anonymous".to_string()
}

/// Messages sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join (or create) a session, leaving the current one if any
    JoinSession {
        #[serde(default = "default_session")]
        session_id: String,
        #[serde(default = "default_username")]
        username: String,
    },
    /// Freehand stroke data, relayed to the rest of the session
    Drawing {
        #[serde(flatten)]
        data: Payload,
    },
    /// Add a canvas object
    AddObject {
        #[serde(flatten)]
        data: Payload,
    },
    /// Modify a canvas object
    ModifyObject {
        #[serde(flatten)]
        data: Payload,
    },
    /// Delete a canvas object
    DeleteObject {
        #[serde(flatten)]
        data: Payload,
    },
    /// Cursor position update
    CursorMove {
        #[serde(flatten)]
        data: Payload,
    },
    /// Clear the session's canvas and stored snapshot
    ClearCanvas,
    /// Persist a canvas snapshot for late joiners
    SaveCanvas {
        #[serde(default)]
        canvas_state: Option<Value>,
    },
}

impl ClientMessage {
    /// Parse a raw text frame into a client message.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Messages sent to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on connect with the generated identity.
    /// `session_id` is the transport connection id, kept for compatibility
    /// with existing clients (see DESIGN.md).
    Connected { user_id: String, session_id: String },
    /// Confirm a join to the joining connection
    SessionJoined { session_id: String, user_count: usize },
    /// Another user joined the session
    UserJoined {
        user_id: String,
        username: String,
        session_id: String,
        user_count: usize,
    },
    /// A user left the session
    UserLeft { user_id: String, session_id: String },
    /// Saved canvas snapshot, sent to a joining connection only
    LoadCanvas { canvas_state: Value },
    /// Stroke from another user
    Drawing {
        #[serde(flatten)]
        data: Payload,
    },
    /// Object added by another user
    AddObject {
        #[serde(flatten)]
        data: Payload,
    },
    /// Object modified by another user
    ModifyObject {
        #[serde(flatten)]
        data: Payload,
    },
    /// Object deleted by another user
    DeleteObject {
        #[serde(flatten)]
        data: Payload,
    },
    /// Cursor update from another user
    CursorMove {
        #[serde(flatten)]
        data: Payload,
    },
    /// Clear the canvas (sent to the whole session, sender included)
    ClearCanvas,
    /// Acknowledge a snapshot save to the caller only
    CanvasSaved { status: String },
    /// Protocol-level error reply
    Error { message: String },
}

impl ServerMessage {
    /// The `canvas_saved` acknowledgement.
    pub fn canvas_saved() -> Self {
        ServerMessage::CanvasSaved {
            status: "success".to_string(),
        }
    }
}

/// Errors produced while decoding inbound frames
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame was not a valid message
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_session_defaults() {
        let msg = ClientMessage::parse(r#"{"type":"join_session"}"#).unwrap();
        match msg {
            ClientMessage::JoinSession {
                session_id,
                username,
            } => {
                assert_eq!(session_id, "default");
                assert_eq!(username, "Anonymous");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_drawing_payload_is_open() {
        let msg =
            ClientMessage::parse(r##"{"type":"drawing","x":1,"y":2,"color":"#ff0000"}"##).unwrap();
        match msg {
            ClientMessage::Drawing { data } => {
                assert_eq!(data.get("x"), Some(&json!(1)));
                assert_eq!(data.get("y"), Some(&json!(2)));
                assert_eq!(data.get("color"), Some(&json!("#ff0000")));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_clear_canvas_has_no_fields() {
        let msg = ClientMessage::parse(r#"{"type":"clear_canvas"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::ClearCanvas));
    }

    #[test]
    fn test_save_canvas_missing_state_is_none() {
        let msg = ClientMessage::parse(r#"{"type":"save_canvas"}"#).unwrap();
        match msg {
            ClientMessage::SaveCanvas { canvas_state } => assert!(canvas_state.is_none()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_frame_is_rejected() {
        assert!(ClientMessage::parse("not json").is_err());
        assert!(ClientMessage::parse(r#"{"type":"launch_missiles"}"#).is_err());
    }

    #[test]
    fn test_server_message_tagging() {
        let msg = ServerMessage::SessionJoined {
            session_id: "room1".to_string(),
            user_count: 2,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type":"session_joined","session_id":"room1","user_count":2})
        );
    }

    #[test]
    fn test_relayed_payload_flattens() {
        let mut data = Payload::new();
        data.insert("x".to_string(), json!(1));
        data.insert(KEY_USER_ID.to_string(), json!("u-1"));
        let value = serde_json::to_value(&ServerMessage::Drawing { data }).unwrap();
        assert_eq!(value, json!({"type":"drawing","x":1,"user_id":"u-1"}));
    }

    #[test]
    fn test_canvas_saved_status() {
        let value = serde_json::to_value(&ServerMessage::canvas_saved()).unwrap();
        assert_eq!(value, json!({"type":"canvas_saved","status":"success"}));
    }
}
