//! Presence broadcast fan-out.
//!
//! Status frames are written against a snapshot of live senders captured
//! under the registry lock, never while the lock is held. Best-effort: a
//! dead subscriber is reported back for cleanup and never aborts delivery
//! to the rest.

use chrono::Utc;
use tracing::{debug, warn};

use crate::models::ConnectionId;
use crate::protocol::ServerFrame;

use super::registry::{FrameSender, PresenceChange};

/// Fan a presence change out to every connection in `snapshot`.
///
/// Returns the connections whose writer task is gone; the caller unbinds
/// them.
pub(crate) fn broadcast(
    snapshot: &[(ConnectionId, FrameSender)],
    change: &PresenceChange,
) -> Vec<ConnectionId> {
    let frame = ServerFrame::Presence {
        identity: change.identity.clone(),
        online: change.online,
        timestamp: Utc::now(),
    };

    let mut dead = Vec::new();
    for (id, sender) in snapshot {
        if sender.send(frame.clone()).is_err() {
            warn!("Presence write to connection {} failed, scheduling cleanup", id);
            dead.push(*id);
        }
    }

    debug!(
        "Broadcast presence: {} is {} ({} connections, {} dead)",
        change.identity,
        if change.online { "online" } else { "offline" },
        snapshot.len(),
        dead.len()
    );

    dead
}
