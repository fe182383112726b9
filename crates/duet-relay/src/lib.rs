//! duet-relay: presence, pairing and signaling relay for two-party voice
//! sessions.
//!
//! Participants connect over WebSocket, appear in a shared presence list,
//! and engage each other one-to-one. Once paired, the relay forwards
//! negotiation payloads between the two without inspecting them.

pub mod connection;
pub mod pairing;
pub mod registry;
pub mod relay;
pub mod server;
pub mod store;

pub use connection::ConnectionSettings;
pub use pairing::{Admission, PairingCoordinator};
pub use registry::PresenceRegistry;
pub use relay::SignalingRelay;
pub use server::{serve, spawn_reaper};
pub use store::{MemoryStore, Participant, ParticipantStore};

use duet_config::DuetConfig;

/// Build a coordinator over an in-memory store from config.
pub fn coordinator_from_config(config: &DuetConfig) -> PairingCoordinator<MemoryStore> {
    let registry = PresenceRegistry::new(MemoryStore::new(), config.presence.name_prefix.clone());
    PairingCoordinator::new(registry, SignalingRelay::new())
}
