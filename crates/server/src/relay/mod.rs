//! Message relay core
//!
//! Connection registry, append-only message log, router and presence
//! broadcast behind a single exclusion point. Every registry mutation and
//! log append happens under one mutex, so bind, unbind and append observe a
//! strict total order. Transport writes (delivery, acks, presence fan-out)
//! happen after the lock is dropped, against sender snapshots captured
//! inside the critical section; senders are unbounded queues, so no send
//! blocks a connection handler.

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod message_log;
pub mod presence;
pub mod registry;

pub use message_log::MessageLog;
pub use registry::{Connection, ConnectionRegistry, FrameSender, PresenceChange};

use crate::models::{ConnectionId, Message, UserStatus};
use crate::protocol::ServerFrame;

/// Rejection of a malformed inbound envelope. Input-scoped: the sending
/// connection stays open.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("missing or empty field `{0}`")]
    MissingField(&'static str),
}

struct RelayInner {
    registry: ConnectionRegistry,
    log: MessageLog,
}

/// Shared relay state. One per process; cheap to share behind an `Arc`.
pub struct RelayManager {
    inner: Mutex<RelayInner>,
}

impl Default for RelayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RelayInner {
                registry: ConnectionRegistry::new(),
                log: MessageLog::new(),
            }),
        }
    }

    /// Track a freshly accepted transport connection. The connection stays
    /// unbound until its client sends a `register` frame.
    pub fn connect(&self, sender: FrameSender) -> ConnectionId {
        let id = self.inner.lock().registry.insert(sender);
        debug!("Connection {} accepted", id);
        id
    }

    /// Bind `identity` to a connection and announce the presence change.
    pub fn register(&self, identity: &str, id: ConnectionId) -> Result<(), RelayError> {
        if identity.is_empty() {
            return Err(RelayError::MissingField("from"));
        }

        let (changes, snapshot) = {
            let mut inner = self.inner.lock();
            let changes = inner.registry.bind(identity, id);
            (changes, inner.registry.live_senders())
        };

        if changes.is_empty() {
            debug!("Register for {} on closed connection {}, ignored", identity, id);
            return Ok(());
        }

        info!("Identity {} registered on connection {}", identity, id);
        self.announce(changes, snapshot);
        Ok(())
    }

    /// Remove a connection and announce any resulting offline transition.
    /// Called on socket close, socket error, or a failed push.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let (change, snapshot) = {
                let mut inner = self.inner.lock();
                let change = inner.registry.unbind(current);
                (change, inner.registry.live_senders())
            };
            let Some(change) = change else { continue };
            info!(
                "Identity {} went offline (connection {})",
                change.identity, current
            );
            pending.extend(presence::broadcast(&snapshot, &change));
        }
    }

    /// Validate, timestamp, persist and best-effort deliver one message,
    /// then acknowledge persistence to the sender.
    ///
    /// Delivery and acknowledgment are deliberately decoupled: an offline
    /// recipient or a failed push leaves the message queryable in the log
    /// and still acks the sender.
    pub fn route(
        &self,
        from: &str,
        to: &str,
        text: &str,
        sender: ConnectionId,
    ) -> Result<Message, RelayError> {
        if from.is_empty() {
            return Err(RelayError::MissingField("from"));
        }
        if to.is_empty() {
            return Err(RelayError::MissingField("to"));
        }
        if text.is_empty() {
            return Err(RelayError::MissingField("text"));
        }

        let (message, recipient, ack) = {
            let mut inner = self.inner.lock();
            let message = Message {
                id: Uuid::new_v4().to_string(),
                from: from.to_string(),
                to: to.to_string(),
                text: text.to_string(),
                timestamp: inner.log.ingestion_timestamp(),
            };
            let message = inner.log.append(message);
            let recipient = inner
                .registry
                .lookup(to)
                .map(|conn| (conn.id, conn.sender.clone()));
            let ack = inner.registry.get(sender).map(|conn| conn.sender.clone());
            (message, recipient, ack)
        };

        info!("Logged message {} from {} to {}", message.id, from, to);

        match recipient {
            Some((recipient_id, tx)) => {
                if tx.send(ServerFrame::message(&message)).is_err() {
                    warn!(
                        "Push of message {} to connection {} failed, cleaning up",
                        message.id, recipient_id
                    );
                    self.disconnect(recipient_id);
                }
            }
            None => debug!(
                "Recipient {} offline, message {} stored undelivered",
                to, message.id
            ),
        }

        if let Some(tx) = ack {
            if tx.send(ServerFrame::accepted(&message)).is_err() {
                warn!(
                    "Ack of message {} to connection {} failed, cleaning up",
                    message.id, sender
                );
                self.disconnect(sender);
            }
        }

        Ok(message)
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.inner.lock().registry.is_online(identity)
    }

    /// Message history between `a` and `b`, ascending by ingestion time.
    pub fn history(&self, a: &str, b: &str) -> Vec<Message> {
        self.inner.lock().log.history(a, b)
    }

    /// Every identity the registry has seen, except `exclude`, with live
    /// presence.
    pub fn list_other_identities(&self, exclude: &str) -> Vec<UserStatus> {
        self.inner.lock().registry.statuses(exclude)
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().log.len()
    }

    fn announce(
        &self,
        changes: Vec<PresenceChange>,
        snapshot: Vec<(ConnectionId, FrameSender)>,
    ) {
        let mut dead = Vec::new();
        for change in &changes {
            dead.extend(presence::broadcast(&snapshot, change));
        }
        for id in dead {
            self.disconnect(id);
        }
    }
}
