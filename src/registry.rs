//! Connection registry and participant state
//!
//! The registry is the only shared mutable state in the hub: the map of live
//! connections to participants plus the set of claimed usernames. The two
//! views mutate together under one lock and are never observable in an
//! inconsistent state.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::HubError;

/// Frames pushed to a connection's writer task.
///
/// The registry stores one sender per connection so the broadcast path never
/// touches a socket; a closed channel means the writer task is gone and the
/// connection is dead.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A serialized event envelope.
    Frame(String),
    /// Heartbeat ping.
    Ping,
    /// Ask the writer to send a close frame and stop.
    Close,
}

/// Sender half of a connection's outbound channel.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// Identity of one live transport session.
///
/// Reference identity: generated at accept time, never derived from any
/// payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = self.0.to_string();
        let short = full.split('-').next().unwrap_or(&full);
        write!(f, "conn_{}", short)
    }
}

/// Registered identity and state attached to one active connection
#[derive(Debug, Clone)]
pub struct Participant {
    /// Display name, unique among active participants (trimmed form).
    pub username: String,
    /// Set once at registration.
    pub joined_at: DateTime<Utc>,
    /// Last-known typing indicator.
    pub typing: bool,
}

struct Entry {
    participant: Participant,
    sender: OutboundSender,
    /// Monotonic join sequence, gives `snapshot` a deterministic order.
    seq: u64,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<ConnectionId, Entry>,
    usernames: HashSet<String>,
    next_seq: u64,
}

/// Authoritative mapping of connection identity to participant state.
///
/// Holds only registered connections; a connection that has not completed a
/// successful join is invisible to broadcasts.
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Atomically check-and-claim a username for a connection.
    ///
    /// The caller passes the trimmed name. Fails with no side effects if the
    /// name is claimed or the connection already holds a registration.
    pub fn try_register(
        &self,
        id: ConnectionId,
        username: &str,
        sender: OutboundSender,
    ) -> crate::error::Result<Participant> {
        let mut inner = self.inner.lock();

        if inner.entries.contains_key(&id) {
            return Err(HubError::AlreadyRegistered);
        }
        if inner.usernames.contains(username) {
            return Err(HubError::UsernameTaken);
        }

        let participant = Participant {
            username: username.to_string(),
            joined_at: Utc::now(),
            typing: false,
        };
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.usernames.insert(username.to_string());
        inner.entries.insert(
            id,
            Entry {
                participant: participant.clone(),
                sender,
                seq,
            },
        );
        Ok(participant)
    }

    /// Remove a connection's participant and free its username.
    ///
    /// Idempotent: both the normal-close path and the broadcast-failure
    /// cleanup path may call this for the same connection.
    pub fn unregister(&self, id: ConnectionId) -> Option<Participant> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.remove(&id)?;
        inner.usernames.remove(&entry.participant.username);
        Some(entry.participant)
    }

    /// Update the typing flag for a registered connection.
    ///
    /// Returns the updated participant, or `None` (no-op) if unregistered.
    pub fn set_typing(&self, id: ConnectionId, typing: bool) -> Option<Participant> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get_mut(&id)?;
        entry.participant.typing = typing;
        Some(entry.participant.clone())
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<Participant> {
        self.inner.lock().entries.get(&id).map(|e| e.participant.clone())
    }

    /// Number of active participants.
    pub fn count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Snapshot of all connections in join order, for broadcast iteration.
    ///
    /// Senders are cheap clones; the lock is released before anything is
    /// sent through them.
    pub fn snapshot(&self) -> Vec<(ConnectionId, OutboundSender)> {
        let inner = self.inner.lock();
        let mut items: Vec<(u64, ConnectionId, OutboundSender)> = inner
            .entries
            .iter()
            .map(|(id, e)| (e.seq, *id, e.sender.clone()))
            .collect();
        items.sort_by_key(|(seq, _, _)| *seq);
        items.into_iter().map(|(_, id, tx)| (id, tx)).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> OutboundSender {
        mpsc::unbounded_channel().0
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();

        let participant = registry.try_register(id, "alice", sender()).unwrap();
        assert_eq!(participant.username, "alice");
        assert!(!participant.typing);

        let found = registry.lookup(id).unwrap();
        assert_eq!(found.username, "alice");
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_username_uniqueness() {
        let registry = ConnectionRegistry::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        registry.try_register(first, "alice", sender()).unwrap();
        let err = registry.try_register(second, "alice", sender()).unwrap_err();
        assert!(matches!(err, HubError::UsernameTaken));

        // Failed attempt left no trace: the loser is not registered and the
        // name is still held by exactly one participant.
        assert!(registry.lookup(second).is_none());
        assert_eq!(registry.count(), 1);

        // The loser can retry with a different name.
        registry.try_register(second, "bob", sender()).unwrap();
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_rejoin_same_connection_rejected() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();

        registry.try_register(id, "alice", sender()).unwrap();
        let err = registry.try_register(id, "alice2", sender()).unwrap_err();
        assert!(matches!(err, HubError::AlreadyRegistered));

        // No mutation: still registered under the original name only.
        assert_eq!(registry.lookup(id).unwrap().username, "alice");
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_unregister_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();

        registry.try_register(id, "alice", sender()).unwrap();
        let removed = registry.unregister(id).unwrap();
        assert_eq!(removed.username, "alice");
        assert!(registry.unregister(id).is_none());
        assert_eq!(registry.count(), 0);

        // Username freed: a new connection can claim it.
        registry
            .try_register(ConnectionId::new(), "alice", sender())
            .unwrap();
    }

    #[test]
    fn test_set_typing() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();

        assert!(registry.set_typing(id, true).is_none());

        registry.try_register(id, "alice", sender()).unwrap();
        let updated = registry.set_typing(id, true).unwrap();
        assert!(updated.typing);
        assert!(registry.lookup(id).unwrap().typing);

        let updated = registry.set_typing(id, false).unwrap();
        assert!(!updated.typing);
    }

    #[test]
    fn test_snapshot_join_order() {
        let registry = ConnectionRegistry::new();
        let ids: Vec<ConnectionId> = (0..4).map(|_| ConnectionId::new()).collect();

        for (i, id) in ids.iter().enumerate() {
            registry
                .try_register(*id, &format!("user{}", i), sender())
                .unwrap();
        }
        registry.unregister(ids[1]);

        let snapshot: Vec<ConnectionId> =
            registry.snapshot().into_iter().map(|(id, _)| id).collect();
        assert_eq!(snapshot, vec![ids[0], ids[2], ids[3]]);
    }
}
