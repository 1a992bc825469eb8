//! Connection registry: the single source of truth for who is online.
//!
//! Bidirectional mapping between identities and live transport connections.
//! Presence records are created on first register and only toggled after
//! that; connections come and go with the sockets they wrap.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use crate::models::{ConnectionId, Identity, UserStatus};
use crate::protocol::ServerFrame;

/// Transport handle for a live connection. Sends never block; a failed send
/// means the connection's writer task is gone.
pub type FrameSender = UnboundedSender<ServerFrame>;

/// A live transport connection tracked by the registry.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub sender: FrameSender,
    pub opened_at: DateTime<Utc>,
    /// Identity this connection is bound to, if the client has registered.
    bound_identity: Option<Identity>,
}

impl Connection {
    pub fn identity(&self) -> Option<&str> {
        self.bound_identity.as_deref()
    }
}

/// Presence record for an identity. Created on first register, never removed
/// for the life of the process.
#[derive(Debug, Clone)]
struct PresenceRecord {
    online: bool,
    bound_connection: Option<ConnectionId>,
}

/// A presence transition produced by a registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    pub identity: Identity,
    pub online: bool,
}

/// Identity <-> connection registry.
///
/// Not internally synchronized: the relay serializes every mutation behind
/// its own lock, so methods take plain `&mut self`.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    presence: HashMap<Identity, PresenceRecord>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly accepted, still unbound connection.
    pub fn insert(&mut self, sender: FrameSender) -> ConnectionId {
        let id = ConnectionId::new();
        self.connections.insert(
            id,
            Connection {
                id,
                sender,
                opened_at: Utc::now(),
                bound_identity: None,
            },
        );
        id
    }

    /// Bind `identity` to the given connection.
    ///
    /// Returns the presence transitions this mutation produced, in the order
    /// they should be announced. A repeat register from the same connection
    /// re-announces `online`; a register from a new connection supersedes
    /// the old binding, which stays open but unaddressable; a register under
    /// a new identity on an already-bound connection releases the old
    /// identity first.
    pub fn bind(&mut self, identity: &str, id: ConnectionId) -> Vec<PresenceChange> {
        let mut changes = Vec::new();
        if !self.connections.contains_key(&id) {
            // Connection already closed out from under the register.
            return changes;
        }

        let previous_identity = self.connections[&id].bound_identity.clone();
        if let Some(old) = previous_identity {
            if old != identity {
                if let Some(record) = self.presence.get_mut(&old) {
                    if record.bound_connection == Some(id) {
                        record.online = false;
                        record.bound_connection = None;
                        changes.push(PresenceChange {
                            identity: old,
                            online: false,
                        });
                    }
                }
            }
        }

        // Superseded connection is marked unbound but left open.
        if let Some(record) = self.presence.get(identity) {
            if let Some(prev) = record.bound_connection {
                if prev != id {
                    if let Some(conn) = self.connections.get_mut(&prev) {
                        conn.bound_identity = None;
                    }
                }
            }
        }

        if let Some(conn) = self.connections.get_mut(&id) {
            conn.bound_identity = Some(identity.to_string());
        }
        self.presence.insert(
            identity.to_string(),
            PresenceRecord {
                online: true,
                bound_connection: Some(id),
            },
        );
        changes.push(PresenceChange {
            identity: identity.to_string(),
            online: true,
        });
        changes
    }

    /// Remove a connection from the registry.
    ///
    /// Returns the offline transition if this connection was the bound one
    /// for some identity; `None` for never-registered or superseded
    /// connections.
    pub fn unbind(&mut self, id: ConnectionId) -> Option<PresenceChange> {
        let conn = self.connections.remove(&id)?;
        let identity = conn.bound_identity?;
        let record = self.presence.get_mut(&identity)?;
        if record.bound_connection != Some(id) {
            return None;
        }
        record.online = false;
        record.bound_connection = None;
        Some(PresenceChange {
            identity,
            online: false,
        })
    }

    /// The live connection bound to `identity`, if any.
    pub fn lookup(&self, identity: &str) -> Option<&Connection> {
        let record = self.presence.get(identity)?;
        let id = record.bound_connection?;
        self.connections.get(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.presence
            .get(identity)
            .map(|record| record.online)
            .unwrap_or(false)
    }

    /// Snapshot of every live connection's sender, for broadcast fan-out
    /// outside the registry lock.
    pub fn live_senders(&self) -> Vec<(ConnectionId, FrameSender)> {
        self.connections
            .values()
            .map(|conn| (conn.id, conn.sender.clone()))
            .collect()
    }

    /// Every identity the registry has ever seen, except `exclude`, with its
    /// current presence.
    pub fn statuses(&self, exclude: &str) -> Vec<UserStatus> {
        self.presence
            .iter()
            .filter(|(identity, _)| identity.as_str() != exclude)
            .map(|(identity, record)| UserStatus {
                identity: identity.clone(),
                online: record.online,
            })
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn sender() -> FrameSender {
        let (tx, rx) = mpsc::unbounded_channel();
        std::mem::forget(rx);
        tx
    }

    #[test]
    fn bind_marks_identity_online() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.insert(sender());

        let changes = registry.bind("alice", id);

        assert_eq!(
            changes,
            vec![PresenceChange {
                identity: "alice".to_string(),
                online: true
            }]
        );
        assert!(registry.is_online("alice"));
        assert_eq!(registry.lookup("alice").unwrap().id, id);
    }

    #[test]
    fn unbind_of_bound_connection_goes_offline() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.insert(sender());
        registry.bind("alice", id);

        let change = registry.unbind(id).unwrap();

        assert!(!change.online);
        assert_eq!(change.identity, "alice");
        assert!(!registry.is_online("alice"));
        assert!(registry.lookup("alice").is_none());
        // Presence record survives the connection.
        assert_eq!(registry.statuses("").len(), 1);
    }

    #[test]
    fn unbind_of_never_registered_connection_is_a_noop() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.insert(sender());

        assert!(registry.unbind(id).is_none());
        assert_eq!(registry.connection_count(), 0);
        // Unknown id is also a no-op.
        assert!(registry.unbind(ConnectionId::new()).is_none());
    }

    #[test]
    fn second_register_supersedes_first_connection() {
        let mut registry = ConnectionRegistry::new();
        let first = registry.insert(sender());
        let second = registry.insert(sender());
        registry.bind("alice", first);

        let changes = registry.bind("alice", second);

        // No offline transition: the identity never left.
        assert_eq!(
            changes,
            vec![PresenceChange {
                identity: "alice".to_string(),
                online: true
            }]
        );
        assert_eq!(registry.lookup("alice").unwrap().id, second);
        // The superseded connection stays live but unbound.
        assert_eq!(registry.connection_count(), 2);
        assert!(registry.get(first).unwrap().identity().is_none());

        // Closing the superseded connection later does not knock alice off.
        assert!(registry.unbind(first).is_none());
        assert!(registry.is_online("alice"));
    }

    #[test]
    fn rebinding_same_connection_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.insert(sender());
        registry.bind("alice", id);

        let changes = registry.bind("alice", id);

        assert_eq!(changes.len(), 1);
        assert!(changes[0].online);
        assert_eq!(registry.lookup("alice").unwrap().id, id);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn rebinding_new_identity_releases_the_old_one() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.insert(sender());
        registry.bind("alice", id);

        let changes = registry.bind("bob", id);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].identity, "alice");
        assert!(!changes[0].online);
        assert_eq!(changes[1].identity, "bob");
        assert!(changes[1].online);
        assert!(!registry.is_online("alice"));
        assert!(registry.is_online("bob"));
    }

    #[test]
    fn bind_after_close_is_ignored() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.insert(sender());
        registry.unbind(id);

        assert!(registry.bind("alice", id).is_empty());
        assert!(!registry.is_online("alice"));
    }

    #[test]
    fn statuses_exclude_the_caller() {
        let mut registry = ConnectionRegistry::new();
        let a = registry.insert(sender());
        let b = registry.insert(sender());
        registry.bind("alice", a);
        registry.bind("bob", b);
        registry.unbind(b);

        let mut statuses = registry.statuses("alice");
        statuses.sort_by(|x, y| x.identity.cmp(&y.identity));

        assert_eq!(
            statuses,
            vec![UserStatus {
                identity: "bob".to_string(),
                online: false
            }]
        );
    }
}
