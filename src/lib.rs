//! chat-hub: real-time message-broadcast hub over WebSocket
//!
//! A server that accepts many concurrent bidirectional client connections,
//! enforces a join protocol with unique display names, and fans chat events
//! (joins, leaves, messages, typing indicators, presence counts) out to all
//! connected participants.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    CHAT HUB (chat-hubd)                    │
//! ├────────────────────────────────────────────────────────────┤
//! │                                                            │
//! │  ConnectionRegistry (Mutex)                                │
//! │    ConnectionId ──► Participant { username, joined_at,     │
//! │                                   typing } + outbound tx   │
//! │    claimed usernames (uniqueness set)                      │
//! │                                                            │
//! │  ChatHub ──► serialize-once fan-out over a registry        │
//! │              snapshot; failed sends cleaned up after the   │
//! │              pass with the same leave sequence as an       │
//! │              explicit disconnect                           │
//! │                                                            │
//! │  One Session per connection                                │
//! │    - reader loop (frames in arrival order)                 │
//! │    - writer task (owns the sink)                           │
//! │    - heartbeat task (ping/pong liveness)                   │
//! │                                                            │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! All messages are JSON over WebSocket:
//!
//! ```json
//! // Client -> Server
//! {"type": "join", "username": "alice"}
//! {"type": "message", "content": "hello"}
//! {"type": "typing", "typing": true}
//!
//! // Server -> Client
//! {"type": "join", "username": "alice", "timestamp": "..."}
//! {"type": "message", "username": "alice", "content": "hello", "timestamp": "..."}
//! {"type": "users_count", "count": 2, "timestamp": "..."}
//! {"type": "error", "message": "Username already taken", "timestamp": "..."}
//! ```

pub mod connection;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod registry;
pub mod server;

// Re-export commonly used types
pub use connection::{handle_connection, Session};
pub use error::{HubError, Result};
pub use hub::ChatHub;
pub use protocol::{decode, ClientMessage, ServerEvent, MAX_MESSAGE_LEN, MAX_USERNAME_LEN};
pub use registry::{ConnectionId, ConnectionRegistry, Outbound, OutboundSender, Participant};
pub use server::{run, ServerConfig};
