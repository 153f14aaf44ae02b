//! Wire protocol message types
//!
//! Defines the JSON envelope format for client-server communication. All
//! envelopes are tagged objects:
//!
//! ```json
//! // Client -> Server
//! {"type": "join", "username": "alice"}
//! {"type": "message", "content": "hello"}
//! {"type": "typing", "typing": true}
//!
//! // Server -> Client
//! {"type": "join", "username": "alice", "timestamp": "..."}
//! {"type": "users_count", "count": 2, "timestamp": "..."}
//! {"type": "error", "message": "...", "timestamp": "..."}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// Maximum display-name length in characters, after trimming.
pub const MAX_USERNAME_LEN: usize = 20;

/// Maximum chat message length in characters, after trimming.
pub const MAX_MESSAGE_LEN: usize = 500;

/// Client-to-server message
///
/// Fields default when absent, so `{"type": "join"}` decodes to an empty
/// username and is rejected by validation rather than by the codec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request to join with a display name
    Join {
        #[serde(default)]
        username: String,
    },
    /// Chat message to fan out
    Message {
        #[serde(default)]
        content: String,
    },
    /// Typing indicator update
    Typing {
        #[serde(default)]
        typing: bool,
    },
}

/// Server-to-client event
///
/// Events are immutable once constructed and carry no connection identity;
/// routing is decided by the broadcast call, not the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A participant joined
    Join {
        username: String,
        timestamp: DateTime<Utc>,
    },
    /// A participant left
    Leave {
        username: String,
        timestamp: DateTime<Utc>,
    },
    /// A chat message
    Message {
        username: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// A typing indicator update
    Typing {
        username: String,
        typing: bool,
        timestamp: DateTime<Utc>,
    },
    /// Current participant count
    UsersCount {
        count: usize,
        timestamp: DateTime<Utc>,
    },
    /// Error response
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerEvent {
    pub fn join(username: String) -> Self {
        Self::Join {
            username,
            timestamp: Utc::now(),
        }
    }

    pub fn leave(username: String) -> Self {
        Self::Leave {
            username,
            timestamp: Utc::now(),
        }
    }

    pub fn message(username: String, content: String) -> Self {
        Self::Message {
            username,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn typing(username: String, typing: bool) -> Self {
        Self::Typing {
            username,
            typing,
            timestamp: Utc::now(),
        }
    }

    pub fn users_count(count: usize) -> Self {
        Self::UsersCount {
            count,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self::Error {
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Decode one inbound text frame into a [`ClientMessage`].
///
/// Distinguishes the three decode-level failures:
/// - not JSON at all -> [`HubError::InvalidJson`]
/// - JSON with an unrecognized or missing `type` -> [`HubError::UnknownType`]
/// - recognized `type` with malformed fields -> [`HubError::Internal`]
pub fn decode(text: &str) -> crate::error::Result<ClientMessage> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| HubError::InvalidJson)?;

    match serde_json::from_value::<ClientMessage>(value.clone()) {
        Ok(msg) => Ok(msg),
        Err(e) => match value.get("type").and_then(|v| v.as_str()) {
            Some("join") | Some("message") | Some("typing") => Err(HubError::Internal(e)),
            Some(other) => Err(HubError::UnknownType(other.to_string())),
            // Missing or non-string `type`: report its raw JSON rendering.
            None => Err(HubError::UnknownType(
                value
                    .get("type")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null)
                    .to_string(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_join() {
        let msg = decode(r#"{"type":"join","username":"alice"}"#).unwrap();
        match msg {
            ClientMessage::Join { username } => assert_eq!(username, "alice"),
            _ => panic!("Expected Join message"),
        }
    }

    #[test]
    fn test_decode_missing_fields_default() {
        let msg = decode(r#"{"type":"join"}"#).unwrap();
        match msg {
            ClientMessage::Join { username } => assert_eq!(username, ""),
            _ => panic!("Expected Join message"),
        }

        let msg = decode(r#"{"type":"typing"}"#).unwrap();
        match msg {
            ClientMessage::Typing { typing } => assert!(!typing),
            _ => panic!("Expected Typing message"),
        }
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode("not json at all").unwrap_err();
        assert!(matches!(err, HubError::InvalidJson));
        assert_eq!(err.to_string(), "Invalid JSON format");
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = decode(r#"{"type":"shout","content":"hi"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unknown message type: shout");
    }

    #[test]
    fn test_decode_missing_type() {
        let err = decode(r#"{"username":"alice"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unknown message type: null");
    }

    #[test]
    fn test_decode_wrong_field_type_is_internal() {
        let err = decode(r#"{"type":"join","username":42}"#).unwrap_err();
        assert!(matches!(err, HubError::Internal(_)));
        assert_eq!(err.to_string(), "Server error processing message");
    }

    #[test]
    fn test_encode_event_envelope() {
        let event = ServerEvent::users_count(3);
        let value: serde_json::Value =
            serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "users_count");
        assert_eq!(value["count"], 3);
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_encode_message_event() {
        let event = ServerEvent::message("bob".to_string(), "hi there".to_string());
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["username"], "bob");
        assert_eq!(value["content"], "hi there");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_error_messages_match_wire_contract() {
        assert_eq!(
            HubError::EmptyUsername.to_string(),
            "Username cannot be empty"
        );
        assert_eq!(
            HubError::UsernameTooLong.to_string(),
            "Username too long (max 20 characters)"
        );
        assert_eq!(
            HubError::UsernameTaken.to_string(),
            "Username already taken"
        );
        assert_eq!(HubError::NotRegistered.to_string(), "Not registered");
        assert_eq!(
            HubError::MessageTooLong.to_string(),
            "Message too long (max 500 characters)"
        );
    }
}
