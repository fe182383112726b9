//! Pairing coordinator: exclusive, race-free engagement between participants.
//!
//! Every operation runs inside one write guard over the presence
//! registry, so availability is validated and both partner pointers are
//! written in the same critical section. Outbound notifications are
//! queued while the guard is held, which keeps them in the same order as
//! the mutations that caused them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use duet_common::{PairingRejection, PresenceEntry, ServerMessage};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::registry::PresenceRegistry;
use crate::relay::SignalingRelay;
use crate::store::{Participant, ParticipantStore};

/// Result of a successful join or rejoin.
#[derive(Debug, Clone)]
pub struct Admission {
    pub participant: Participant,
    /// Connection id to hand back to `on_disconnect`.
    pub connection_id: u64,
    /// True when a rejoin reused the prior id.
    pub reused: bool,
}

pub struct PairingCoordinator<S> {
    registry: Arc<RwLock<PresenceRegistry<S>>>,
    relay: SignalingRelay,
}

impl<S> Clone for PairingCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            relay: self.relay.clone(),
        }
    }
}

impl<S: ParticipantStore> PairingCoordinator<S> {
    pub fn new(registry: PresenceRegistry<S>, relay: SignalingRelay) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            relay,
        }
    }

    pub fn relay(&self) -> &SignalingRelay {
        &self.relay
    }

    /// Admit a new participant, attach its outbound channel, confirm its
    /// identity and broadcast the updated presence list.
    pub async fn join(
        &self,
        display_name: Option<String>,
        tx: mpsc::Sender<ServerMessage>,
    ) -> Admission {
        let mut registry = self.registry.write().await;
        let participant = registry.join(display_name);
        let connection_id = self.admit(&mut registry, &participant, tx).await;
        info!(participant = %participant.id, name = %participant.display_name, "Participant joined");
        Admission {
            participant,
            connection_id,
            reused: false,
        }
    }

    /// Admit a returning participant, reusing `prior_id` if it is still
    /// registered. A session left over from the previous connection is
    /// released first; it cannot be resumed.
    pub async fn rejoin(&self, prior_id: &str, tx: mpsc::Sender<ServerMessage>) -> Admission {
        let mut registry = self.registry.write().await;
        let (participant, reused) = registry.rejoin(prior_id);
        if reused && participant.is_engaged() {
            self.release_locked(&mut registry, &participant.id).await.ok();
        }
        let participant = registry.get(&participant.id).unwrap_or(participant);
        let connection_id = self.admit(&mut registry, &participant, tx).await;
        info!(participant = %participant.id, reused, "Participant rejoined");
        Admission {
            participant,
            connection_id,
            reused,
        }
    }

    /// Engage `requester_id` with `target_id`. Succeeds only if both exist,
    /// differ and are currently free; otherwise nothing changes.
    pub async fn toggle_engagement(
        &self,
        requester_id: &str,
        target_id: &str,
    ) -> Result<(), PairingRejection> {
        if requester_id == target_id {
            return Err(PairingRejection::SelfEngagement);
        }

        let mut registry = self.registry.write().await;
        let requester = registry
            .get(requester_id)
            .ok_or_else(|| PairingRejection::UnknownParticipant(requester_id.to_string()))?;
        let target = registry
            .get(target_id)
            .ok_or_else(|| PairingRejection::UnknownParticipant(target_id.to_string()))?;
        if requester.is_engaged() {
            return Err(PairingRejection::RequesterEngaged(requester_id.to_string()));
        }
        if target.is_engaged() {
            return Err(PairingRejection::TargetEngaged(target_id.to_string()));
        }

        registry.set_engaged(requester_id, Some(target_id.to_string()));
        registry.set_engaged(target_id, Some(requester_id.to_string()));

        self.relay
            .send_to(
                requester_id,
                ServerMessage::Paired {
                    partner_id: target_id.to_string(),
                },
            )
            .await;
        self.relay
            .send_to(
                target_id,
                ServerMessage::Paired {
                    partner_id: requester_id.to_string(),
                },
            )
            .await;
        self.broadcast_presence(&registry).await;

        info!(participant = %requester_id, partner = %target_id, "Participants paired");
        Ok(())
    }

    /// End the participant's engagement. Returns the former partner's id.
    pub async fn release_engagement(&self, participant_id: &str) -> Result<String, PairingRejection> {
        let mut registry = self.registry.write().await;
        self.release_locked(&mut registry, participant_id).await
    }

    /// Handle a closed connection: release, deregister, broadcast. A
    /// connection superseded by a rejoin is ignored.
    pub async fn on_disconnect(&self, participant_id: &str, connection_id: u64) -> Option<Participant> {
        let mut registry = self.registry.write().await;
        if !self.relay.unregister(participant_id, connection_id).await {
            debug!(participant = %participant_id, "Superseded connection closed");
            return None;
        }
        let removed = self.depart_locked(&mut registry, participant_id).await;
        info!(participant = %participant_id, "Participant disconnected");
        removed
    }

    /// Treat every participant idle for longer than `max_age` as
    /// disconnected. Returns the ids that were removed.
    pub async fn reap_stale(&self, max_age: Duration) -> Vec<String> {
        let Some(cutoff) = Instant::now().checked_sub(max_age) else {
            return Vec::new();
        };

        let mut registry = self.registry.write().await;
        let stale = registry.stale_since(cutoff);
        for id in &stale {
            info!(participant = %id, "Reaping stale participant");
            self.relay.remove(id).await;
            self.depart_locked(&mut registry, id).await;
        }
        stale
    }

    /// Record activity for `participant_id`.
    pub async fn touch(&self, participant_id: &str) {
        self.registry.write().await.touch(participant_id);
    }

    pub async fn participant(&self, participant_id: &str) -> Option<Participant> {
        self.registry.read().await.get(participant_id)
    }

    pub async fn presence(&self) -> Vec<PresenceEntry> {
        self.registry.read().await.snapshot()
    }

    // -----------------------------------------------------------------------
    // Helpers (caller holds the registry write guard)
    // -----------------------------------------------------------------------

    async fn admit(
        &self,
        registry: &mut PresenceRegistry<S>,
        participant: &Participant,
        tx: mpsc::Sender<ServerMessage>,
    ) -> u64 {
        let connection_id = self.relay.register(&participant.id, tx).await;
        self.relay
            .send_to(
                &participant.id,
                ServerMessage::Joined {
                    participant_id: participant.id.clone(),
                    display_name: participant.display_name.clone(),
                },
            )
            .await;
        self.broadcast_presence(registry).await;
        connection_id
    }

    async fn release_locked(
        &self,
        registry: &mut PresenceRegistry<S>,
        participant_id: &str,
    ) -> Result<String, PairingRejection> {
        let participant = registry
            .get(participant_id)
            .ok_or_else(|| PairingRejection::UnknownParticipant(participant_id.to_string()))?;
        let partner_id = participant
            .engaged_with
            .ok_or_else(|| PairingRejection::NotEngaged(participant_id.to_string()))?;

        registry.set_engaged(participant_id, None);
        let partner_points_back = registry
            .get(&partner_id)
            .is_some_and(|p| p.engaged_with.as_deref() == Some(participant_id));
        if partner_points_back {
            registry.set_engaged(&partner_id, None);
        }

        self.relay
            .send_to(
                &partner_id,
                ServerMessage::Released {
                    partner_id: participant_id.to_string(),
                },
            )
            .await;
        self.relay
            .send_to(
                participant_id,
                ServerMessage::Released {
                    partner_id: partner_id.clone(),
                },
            )
            .await;
        self.broadcast_presence(registry).await;

        info!(participant = %participant_id, partner = %partner_id, "Engagement released");
        Ok(partner_id)
    }

    async fn depart_locked(
        &self,
        registry: &mut PresenceRegistry<S>,
        participant_id: &str,
    ) -> Option<Participant> {
        if let Err(reason) = self.release_locked(registry, participant_id).await {
            debug!(participant = %participant_id, %reason, "Nothing to release on departure");
        }
        let removed = registry.remove(participant_id);
        self.broadcast_presence(registry).await;
        removed
    }

    async fn broadcast_presence(&self, registry: &PresenceRegistry<S>) {
        let participants = registry.snapshot();
        self.relay
            .broadcast(ServerMessage::PresenceList { participants })
            .await;
    }
}

#[cfg(test)]
mod tests;
