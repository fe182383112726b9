//! Local microphone control for the active session.
//!
//! Each effective toggle attaches or detaches the track on the active
//! transport, asks the engine for one negotiation cycle (extra triggers
//! coalesce inside the engine) and announces the new mic state to the
//! room.

use std::sync::Arc;

use duet_common::{ClientMessage, TransportError};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::engine::NegotiationEngine;
use crate::transport::{CaptureSource, MediaTransport};
use crate::types::AudioTrack;

pub struct MediaSessionController<C, T> {
    capture: C,
    track: Mutex<Option<AudioTrack>>,
    engine: RwLock<Option<Arc<NegotiationEngine<T>>>>,
    outbound: mpsc::Sender<ClientMessage>,
}

impl<C: CaptureSource, T: MediaTransport> MediaSessionController<C, T> {
    pub fn new(capture: C, outbound: mpsc::Sender<ClientMessage>) -> Self {
        Self {
            capture,
            track: Mutex::new(None),
            engine: RwLock::new(None),
            outbound,
        }
    }

    pub async fn is_capturing(&self) -> bool {
        self.track.lock().await.is_some()
    }

    /// Bind to a new session and attach the live track, if any, to its
    /// transport. No negotiation is triggered; the session's first offer
    /// carries the track.
    pub async fn attach_session(&self, engine: Arc<NegotiationEngine<T>>) {
        if let Some(track) = self.track.lock().await.as_ref() {
            if let Err(e) = engine.transport().attach_track(track).await {
                warn!(partner = %engine.partner_id(), error = %e, "Failed to attach local track");
            }
        }
        *self.engine.write().await = Some(engine);
    }

    pub async fn detach_session(&self) {
        self.engine.write().await.take();
    }

    /// Open the microphone. Returns false if it was already on.
    pub async fn enable_local_capture(&self) -> Result<bool, TransportError> {
        let engine = {
            let mut slot = self.track.lock().await;
            if slot.is_some() {
                debug!("Capture already enabled");
                return Ok(false);
            }

            let track = self.capture.open().await?;
            let engine = self.engine.read().await.clone();
            if let Some(engine) = &engine {
                if let Err(e) = engine.transport().attach_track(&track).await {
                    self.capture.close(&track).await;
                    return Err(e);
                }
            }
            info!(track = %track.id, "Local capture enabled");
            *slot = Some(track);
            engine
        };

        self.announce(true).await;
        if let Some(engine) = engine {
            renegotiate(&engine).await;
        }
        Ok(true)
    }

    /// Close the microphone. Returns false if it was already off.
    pub async fn disable_local_capture(&self) -> Result<bool, TransportError> {
        let engine = {
            let mut slot = self.track.lock().await;
            let Some(track) = slot.take() else {
                debug!("Capture already disabled");
                return Ok(false);
            };

            let engine = self.engine.read().await.clone();
            if let Some(engine) = &engine {
                if let Err(e) = engine.transport().detach_track(&track).await {
                    warn!(partner = %engine.partner_id(), error = %e, "Failed to detach local track");
                }
            }
            self.capture.close(&track).await;
            info!(track = %track.id, "Local capture disabled");
            engine
        };

        self.announce(false).await;
        if let Some(engine) = engine {
            renegotiate(&engine).await;
        }
        Ok(true)
    }

    async fn announce(&self, mic_on: bool) {
        let _ = self.outbound.send(ClientMessage::MicState { mic_on }).await;
    }
}

async fn renegotiate<T: MediaTransport>(engine: &NegotiationEngine<T>) {
    match engine.on_local_description_needed().await {
        Ok(outcome) => debug!(partner = %engine.partner_id(), ?outcome, "Renegotiation triggered"),
        Err(e) => warn!(partner = %engine.partner_id(), error = %e, "Renegotiation failed"),
    }
}
