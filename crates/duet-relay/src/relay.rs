//! Signaling relay: maps participant ids to their outbound channels.
//!
//! The relay never inspects negotiation payloads and stores nothing but
//! the live channel table. Delivery is best-effort: a message for an
//! unknown, disconnected or backed-up participant is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use duet_common::{ServerMessage, SignalKind, SignalingMessage};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Source of connection ids. Ids distinguish a participant's current
/// socket from a superseded one after a rejoin.
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

struct Peer {
    connection_id: u64,
    tx: mpsc::Sender<ServerMessage>,
}

/// Thread-safe participant channel table.
#[derive(Clone, Default)]
pub struct SignalingRelay {
    peers: Arc<RwLock<HashMap<String, Peer>>>,
}

impl SignalingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `tx` as the participant's channel, replacing any previous
    /// one. Returns the connection id for a later `unregister`.
    pub async fn register(&self, participant_id: &str, tx: mpsc::Sender<ServerMessage>) -> u64 {
        let connection_id = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .peers
            .write()
            .await
            .insert(participant_id.to_string(), Peer { connection_id, tx });
        if previous.is_some() {
            debug!(participant = %participant_id, "Replaced existing channel");
        }
        connection_id
    }

    /// Detach the participant's channel only if it still belongs to
    /// `connection_id`. Returns true if it did.
    pub async fn unregister(&self, participant_id: &str, connection_id: u64) -> bool {
        let mut peers = self.peers.write().await;
        match peers.get(participant_id) {
            Some(peer) if peer.connection_id == connection_id => {
                peers.remove(participant_id);
                true
            }
            _ => false,
        }
    }

    /// Detach the participant's channel whatever connection owns it.
    pub async fn remove(&self, participant_id: &str) -> bool {
        self.peers.write().await.remove(participant_id).is_some()
    }

    #[cfg(test)]
    pub(crate) async fn is_connected(&self, participant_id: &str) -> bool {
        self.peers.read().await.contains_key(participant_id)
    }

    /// Number of connected participants.
    pub async fn count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Send a frame to one participant. Returns false if it was dropped.
    pub async fn send_to(&self, participant_id: &str, message: ServerMessage) -> bool {
        let peers = self.peers.read().await;
        let Some(peer) = peers.get(participant_id) else {
            debug!(participant = %participant_id, "Dropping message for unknown participant");
            return false;
        };
        deliver(participant_id, peer, message)
    }

    /// Send a frame to every connected participant. Returns the number of
    /// participants it was queued for.
    pub async fn broadcast(&self, message: ServerMessage) -> usize {
        let peers = self.peers.read().await;
        peers
            .iter()
            .filter(|(id, peer)| deliver(id, peer, message.clone()))
            .count()
    }

    /// Forward a negotiation payload verbatim from `from_id` to `to_id`.
    pub async fn relay(
        &self,
        kind: SignalKind,
        from_id: &str,
        to_id: &str,
        payload: serde_json::Value,
    ) -> bool {
        let signal = SignalingMessage {
            kind,
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            payload,
        };
        self.send_to(to_id, ServerMessage::from(signal)).await
    }
}

fn deliver(participant_id: &str, peer: &Peer, message: ServerMessage) -> bool {
    match peer.tx.try_send(message) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(participant = %participant_id, "Outbound queue full, dropping message");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(participant = %participant_id, "Channel closed, dropping message");
            false
        }
    }
}
