//! Error types for the chat hub
//!
//! Every variant's `Display` string is the exact `message` sent in the wire
//! `error` envelope, so the error type doubles as the protocol's error
//! vocabulary.

use thiserror::Error;

/// Main error type for hub operations
#[derive(Error, Debug)]
pub enum HubError {
    /// Frame was not valid JSON at all.
    #[error("Invalid JSON format")]
    InvalidJson,

    /// Frame was valid JSON but carried an unrecognized `type` discriminator.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("Username too long (max 20 characters)")]
    UsernameTooLong,

    #[error("Username already taken")]
    UsernameTaken,

    /// A `join` from a connection that already holds a registration.
    #[error("Already registered")]
    AlreadyRegistered,

    #[error("Not registered")]
    NotRegistered,

    #[error("Message too long (max 500 characters)")]
    MessageTooLong,

    /// Unexpected fault while handling one frame. Contained to that frame;
    /// the connection survives.
    #[error("Server error processing message")]
    Internal(#[from] serde_json::Error),
}

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, HubError>;
