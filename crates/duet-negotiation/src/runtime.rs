//! Participant runtime: turns relay frames into session lifecycle and
//! engine input, and engine output back into relay frames.

use std::sync::Arc;

use duet_common::{ClientMessage, PresenceEntry, Role, ServerMessage};
use duet_config::NegotiationConfig;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::engine::NegotiationEngine;
use crate::media::MediaSessionController;
use crate::transport::{CaptureSource, TransportFactory};
use crate::types::{NegotiationEvent, NegotiationSnapshot};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Joined {
        participant_id: String,
        display_name: String,
    },
    PresenceChanged(Vec<PresenceEntry>),
    Paired {
        partner_id: String,
        role: Role,
    },
    Released {
        partner_id: String,
    },
    SessionFailed {
        partner_id: String,
        reason: String,
    },
    RemoteStreamReady {
        partner_id: String,
        track_id: String,
    },
    PartnerMicChanged {
        partner_id: String,
        mic_on: bool,
    },
}

struct ActiveSession<T> {
    partner_id: String,
    engine: Arc<NegotiationEngine<T>>,
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

pub struct CallRuntime<F: TransportFactory, C> {
    factory: F,
    ice_servers: Vec<String>,
    local_id: RwLock<Option<String>>,
    session: Mutex<Option<ActiveSession<F::Transport>>>,
    media: MediaSessionController<C, F::Transport>,
    outbound: mpsc::Sender<ClientMessage>,
    call_tx: mpsc::Sender<CallEvent>,
    engine_tx: mpsc::Sender<NegotiationEvent>,
    engine_rx: Mutex<Option<mpsc::Receiver<NegotiationEvent>>>,
}

impl<F: TransportFactory, C: CaptureSource> CallRuntime<F, C> {
    /// `outbound` carries frames to the relay, e.g. `SignalingClient::sender`.
    /// Returns `(runtime, call_event_receiver)`.
    pub fn new(
        factory: F,
        capture: C,
        config: &NegotiationConfig,
        outbound: mpsc::Sender<ClientMessage>,
    ) -> (Self, mpsc::Receiver<CallEvent>) {
        let (call_tx, call_rx) = mpsc::channel(256);
        let (engine_tx, engine_rx) = mpsc::channel(256);
        let runtime = Self {
            factory,
            ice_servers: config.ice_servers.clone(),
            local_id: RwLock::new(None),
            session: Mutex::new(None),
            media: MediaSessionController::new(capture, outbound.clone()),
            outbound,
            call_tx,
            engine_tx,
            engine_rx: Mutex::new(Some(engine_rx)),
        };
        (runtime, call_rx)
    }

    /// Process relay frames and engine events until `inbound` closes.
    /// Can only run once.
    pub async fn run(&self, mut inbound: mpsc::Receiver<ServerMessage>) {
        let Some(mut engine_rx) = self.engine_rx.lock().await.take() else {
            warn!("Call runtime is already running");
            return;
        };

        loop {
            tokio::select! {
                frame = inbound.recv() => {
                    match frame {
                        Some(message) => self.handle_server_message(message).await,
                        None => {
                            info!("Signaling channel closed");
                            self.end_session().await;
                            break;
                        }
                    }
                }
                Some(event) = engine_rx.recv() => {
                    self.handle_negotiation_event(event).await;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    pub async fn toggle_engagement(&self, target_id: &str) {
        self.send(ClientMessage::ToggleEngagement {
            target_id: target_id.to_string(),
        })
        .await;
    }

    /// Ask the relay to end the session. Local teardown follows the
    /// `released` frame.
    pub async fn release(&self) {
        self.send(ClientMessage::ReleaseEngagement).await;
    }

    pub async fn enable_mic(&self) -> Result<bool, duet_common::TransportError> {
        self.media.enable_local_capture().await
    }

    pub async fn disable_mic(&self) -> Result<bool, duet_common::TransportError> {
        self.media.disable_local_capture().await
    }

    pub async fn local_id(&self) -> Option<String> {
        self.local_id.read().await.clone()
    }

    pub async fn partner_id(&self) -> Option<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.partner_id.clone())
    }

    /// State of the active session's engine, if any.
    pub async fn negotiation_snapshot(&self) -> Option<NegotiationSnapshot> {
        let engine = self.session.lock().await.as_ref().map(|s| Arc::clone(&s.engine))?;
        Some(engine.snapshot().await)
    }

    /// Engine of the active session, for wiring transport notifications.
    pub async fn engine(&self) -> Option<Arc<NegotiationEngine<F::Transport>>> {
        self.session.lock().await.as_ref().map(|s| Arc::clone(&s.engine))
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    pub async fn handle_server_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::Joined {
                participant_id,
                display_name,
            } => {
                info!(participant = %participant_id, name = %display_name, "Joined");
                *self.local_id.write().await = Some(participant_id.clone());
                self.emit(CallEvent::Joined {
                    participant_id,
                    display_name,
                })
                .await;
            }
            ServerMessage::PresenceList { participants } => {
                self.emit(CallEvent::PresenceChanged(participants)).await;
            }
            ServerMessage::Paired { partner_id } => self.start_session(partner_id).await,
            ServerMessage::Released { partner_id } => {
                if self.partner_id().await.as_deref() != Some(partner_id.as_str()) {
                    debug!(partner = %partner_id, "Release for inactive session");
                    return;
                }
                self.end_session().await;
                self.emit(CallEvent::Released { partner_id }).await;
            }
            ServerMessage::MicState {
                participant_id,
                mic_on,
            } => {
                if self.partner_id().await.as_deref() == Some(participant_id.as_str()) {
                    self.emit(CallEvent::PartnerMicChanged {
                        partner_id: participant_id,
                        mic_on,
                    })
                    .await;
                }
            }
            ServerMessage::Error { message } => {
                warn!(%message, "Relay reported an error");
            }
            relayed => {
                let Some(signal) = relayed.into_signal() else {
                    return;
                };
                let Some(engine) = self.engine().await else {
                    debug!(from = %signal.from_id, "Signal outside a session, ignored");
                    return;
                };
                if let Err(e) = engine.handle_signal(signal).await {
                    warn!(partner = %engine.partner_id(), error = %e, "Failed to handle signal");
                }
            }
        }
    }

    pub async fn handle_negotiation_event(&self, event: NegotiationEvent) {
        match event {
            NegotiationEvent::Signal(signal) => {
                // Output of a torn-down engine may still be queued.
                if self.partner_id().await.as_deref() != Some(signal.to_id.as_str()) {
                    debug!(to = %signal.to_id, "Dropping signal for inactive session");
                    return;
                }
                self.send(ClientMessage::from_signal(signal)).await;
            }
            NegotiationEvent::RemoteStreamReady {
                partner_id,
                track_id,
            } => {
                self.emit(CallEvent::RemoteStreamReady {
                    partner_id,
                    track_id,
                })
                .await;
            }
            NegotiationEvent::SessionFailed { partner_id, reason } => {
                if self.partner_id().await.as_deref() != Some(partner_id.as_str()) {
                    return;
                }
                self.fail_session(partner_id, reason).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn start_session(&self, partner_id: String) {
        let Some(local_id) = self.local_id().await else {
            warn!(partner = %partner_id, "Paired before joining, ignoring");
            return;
        };
        self.end_session().await;

        let transport = match self.factory.create(&self.ice_servers) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(partner = %partner_id, error = %e, "Failed to create transport");
                self.send(ClientMessage::ReleaseEngagement).await;
                self.emit(CallEvent::SessionFailed {
                    partner_id,
                    reason: e.to_string(),
                })
                .await;
                return;
            }
        };

        let engine = Arc::new(NegotiationEngine::new(
            local_id,
            partner_id.clone(),
            transport,
            self.engine_tx.clone(),
        ));
        let role = engine.role();
        self.media.attach_session(Arc::clone(&engine)).await;
        *self.session.lock().await = Some(ActiveSession {
            partner_id: partner_id.clone(),
            engine: Arc::clone(&engine),
        });

        info!(partner = %partner_id, ?role, "Session started");
        self.emit(CallEvent::Paired { partner_id, role }).await;

        // The polite side waits for the offer.
        if !role.is_polite() {
            if let Err(e) = engine.on_local_description_needed().await {
                warn!(partner = %engine.partner_id(), error = %e, "Initial offer failed");
            }
        }
    }

    async fn end_session(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };
        self.media.detach_session().await;
        session.engine.teardown().await;
    }

    async fn fail_session(&self, partner_id: String, reason: String) {
        warn!(partner = %partner_id, %reason, "Session failed");
        self.end_session().await;
        self.send(ClientMessage::ReleaseEngagement).await;
        self.emit(CallEvent::SessionFailed { partner_id, reason }).await;
    }

    async fn send(&self, message: ClientMessage) {
        if self.outbound.send(message).await.is_err() {
            debug!("Signaling channel closed, dropping frame");
        }
    }

    async fn emit(&self, event: CallEvent) {
        let _ = self.call_tx.send(event).await;
    }
}
