//! Broadcast engine
//!
//! Fans an event out to every registered connection, tolerating per-connection
//! send failure without affecting the rest of the pass. Failures discovered
//! during a fan-out are cleaned up afterwards through the same path as an
//! explicit disconnect, so everyone else still sees the correct leave and
//! presence events.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::ServerEvent;
use crate::registry::{ConnectionId, ConnectionRegistry, Outbound, OutboundSender, Participant};

/// The hub: the connection registry plus the broadcast operations over it.
///
/// Cheap to share behind an [`Arc`]; every operation is synchronous because
/// delivery is a non-blocking push into each connection's outbound channel.
pub struct ChatHub {
    registry: ConnectionRegistry,
}

impl ChatHub {
    pub fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register a participant and announce it: a Join broadcast to everyone
    /// (the new connection included, that is its confirmation) followed by an
    /// updated users count.
    pub fn register(
        &self,
        id: ConnectionId,
        username: &str,
        sender: &OutboundSender,
    ) -> Result<Participant> {
        let participant = self.registry.try_register(id, username, sender.clone())?;
        info!(connection = %id, username = %participant.username, "participant joined");

        self.broadcast(&ServerEvent::join(participant.username.clone()), None);
        self.broadcast_user_count();
        Ok(participant)
    }

    /// Fan one event out to every registered connection except `excluding`.
    ///
    /// The event is serialized once; the registry snapshot is taken under the
    /// lock but every send happens outside it. A failed send marks that
    /// connection dead, never aborts the pass, and is cleaned up after the
    /// pass completes.
    pub fn broadcast(&self, event: &ServerEvent, excluding: Option<ConnectionId>) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to serialize event for broadcast: {}", e);
                return;
            }
        };

        let mut failed = Vec::new();
        for (id, sender) in self.registry.snapshot() {
            if Some(id) == excluding {
                continue;
            }
            if sender.send(Outbound::Frame(payload.clone())).is_err() {
                debug!(connection = %id, "send failed during broadcast, scheduling cleanup");
                failed.push(id);
            }
        }

        // Cleanup pass: each failure produces the same leave sequence an
        // explicit disconnect would. Recursion is bounded by registry size.
        for id in failed {
            self.drop_connection(id);
        }
    }

    /// Broadcast the current participant count to everyone.
    pub fn broadcast_user_count(&self) {
        self.broadcast(&ServerEvent::users_count(self.registry.count()), None);
    }

    /// Terminal cleanup for one connection.
    ///
    /// Idempotent: if the connection was registered, unregisters it and
    /// announces Leave plus the decremented users count to the remainder;
    /// otherwise a no-op. Safe to reach from both the session's exit path and
    /// the broadcast failure path.
    pub fn drop_connection(&self, id: ConnectionId) {
        if let Some(participant) = self.registry.unregister(id) {
            info!(connection = %id, username = %participant.username, "participant left");
            self.broadcast(&ServerEvent::leave(participant.username), None);
            self.broadcast_user_count();
        }
    }

    /// Ask every live connection's writer to close. Used during shutdown.
    pub fn close_all(&self) {
        for (id, sender) in self.registry.snapshot() {
            if sender.send(Outbound::Close).is_err() {
                debug!(connection = %id, "connection already gone at shutdown");
            }
        }
    }
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}
