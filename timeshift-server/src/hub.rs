//! Outbound push channels, one per connected player.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::protocol::ServerEvent;

/// Identifies one connection, so a stale socket closing does not drop the
/// channel of a newer connection by the same player.
pub type ConnectionId = u64;

struct Peer {
    conn: ConnectionId,
    tx: UnboundedSender<ServerEvent>,
}

#[derive(Default)]
pub struct Hub {
    peers: Mutex<HashMap<String, Peer>>,
    next_conn: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<String, Peer>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection. A previous connection of the same player stops
    /// receiving events.
    pub fn register(&self, player_id: &str) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded_channel();
        self.peers().insert(player_id.to_string(), Peer { conn, tx });
        debug!(player_id, conn, "connection registered");
        (conn, rx)
    }

    pub fn unregister(&self, player_id: &str, conn: ConnectionId) {
        let mut peers = self.peers();
        if peers.get(player_id).is_some_and(|p| p.conn == conn) {
            peers.remove(player_id);
            debug!(player_id, conn, "connection unregistered");
        }
    }

    pub fn is_connected(&self, player_id: &str) -> bool {
        self.peers().contains_key(player_id)
    }

    /// Push to one player. Returns false if they are not connected.
    pub fn send(&self, player_id: &str, event: ServerEvent) -> bool {
        match self.peers().get(player_id) {
            Some(peer) => peer.tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn broadcast<'a>(&self, player_ids: impl IntoIterator<Item = &'a str>, event: &ServerEvent) {
        let peers = self.peers();
        for id in player_ids {
            if let Some(peer) = peers.get(id) {
                let _ = peer.tx.send(event.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::QueueState;

    fn idle() -> ServerEvent {
        ServerEvent::QueueStatus {
            status: QueueState::Idle,
            mode: None,
            session_id: None,
        }
    }

    #[test]
    fn test_send_to_disconnected_is_noop() {
        let hub = Hub::new();
        assert!(!hub.send("ghost", idle()));
    }

    #[test]
    fn test_send_and_receive() {
        let hub = Hub::new();
        let (_, mut rx) = hub.register("alice");
        assert!(hub.send("alice", idle()));
        assert_eq!(rx.try_recv().unwrap(), idle());
    }

    #[test]
    fn test_stale_connection_does_not_unregister_newer() {
        let hub = Hub::new();
        let (old, _old_rx) = hub.register("alice");
        let (_new, mut new_rx) = hub.register("alice");
        hub.unregister("alice", old);
        assert!(hub.is_connected("alice"));
        hub.broadcast(["alice", "bob"], &idle());
        assert_eq!(new_rx.try_recv().unwrap(), idle());
    }
}
