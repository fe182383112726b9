//! Perfect-negotiation engine: one per participant per session.
//!
//! Both sides may produce offers at any time. When offers collide, the
//! impolite side keeps its own and drops the remote one; the polite side
//! rolls back and answers. Roles come from `Role::for_pair`, so both
//! sides agree without a round trip.
//!
//! State lives behind a `tokio::sync::Mutex` that is never held across a
//! transport call. An incoming message can therefore be processed while a
//! local offer is being produced, which is exactly the window `making_offer`
//! exists to detect. Every operation remembers the epoch it started in and
//! discards its result if a teardown happened meanwhile.
//!
//! A local change that cannot be offered right away (an offer is already
//! open, or ours lost a collision) is remembered, and exactly one more
//! offer goes out once the phase is back to `Stable`.

mod state;

use std::sync::Arc;

use duet_common::{NegotiationError, Role, SignalKind, SignalingMessage, TransportError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::transport::MediaTransport;
use crate::types::{
    AnswerOutcome, CandidateOutcome, ConnectivityState, IceCandidate, NegotiationEvent,
    NegotiationSnapshot, OfferOutcome, SdpKind, SessionDescription, SignalingPhase,
};

use self::state::NegotiationState;

pub struct NegotiationEngine<T> {
    local_id: String,
    partner_id: String,
    role: Role,
    transport: Arc<T>,
    state: Mutex<NegotiationState>,
    event_tx: mpsc::Sender<NegotiationEvent>,
}

impl<T: MediaTransport> NegotiationEngine<T> {
    pub fn new(
        local_id: impl Into<String>,
        partner_id: impl Into<String>,
        transport: Arc<T>,
        event_tx: mpsc::Sender<NegotiationEvent>,
    ) -> Self {
        let local_id = local_id.into();
        let partner_id = partner_id.into();
        let role = Role::for_pair(&local_id, &partner_id);
        Self {
            local_id,
            partner_id,
            role,
            transport,
            state: Mutex::new(NegotiationState::new()),
            event_tx,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn partner_id(&self) -> &str {
        &self.partner_id
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub async fn snapshot(&self) -> NegotiationSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.is_closed()
    }

    // -----------------------------------------------------------------------
    // Transport notifications
    // -----------------------------------------------------------------------

    /// Local media changed, or the impolite side is starting the session.
    /// At most one local offer is in flight; triggers arriving meanwhile
    /// coalesce into a single follow-up offer.
    pub async fn on_local_description_needed(&self) -> Result<OfferOutcome, NegotiationError> {
        let outcome = self.offer_once().await?;
        self.resume_renegotiation().await;
        Ok(outcome)
    }

    /// Forward a locally gathered candidate to the partner.
    pub async fn on_local_candidate_discovered(&self, candidate: IceCandidate) {
        if self.is_closed().await {
            debug!(partner = %self.partner_id, "Session closed, dropping local candidate");
            return;
        }
        self.send_signal(SignalKind::Candidate, &candidate).await;
    }

    pub async fn on_remote_track_arrived(&self, track_id: impl Into<String>) {
        if self.is_closed().await {
            return;
        }
        let track_id = track_id.into();
        info!(partner = %self.partner_id, track = %track_id, "Remote audio ready");
        self.emit(NegotiationEvent::RemoteStreamReady {
            partner_id: self.partner_id.clone(),
            track_id,
        })
        .await;
    }

    /// `Failed` ends the session for good. Everything else is logged.
    pub async fn on_connectivity_state_changed(&self, connectivity: ConnectivityState) {
        match connectivity {
            ConnectivityState::Failed => {
                if self.is_closed().await {
                    return;
                }
                warn!(partner = %self.partner_id, "Connectivity failed, ending session");
                self.teardown().await;
                self.emit(NegotiationEvent::SessionFailed {
                    partner_id: self.partner_id.clone(),
                    reason: "connectivity failed".into(),
                })
                .await;
            }
            ConnectivityState::Disconnected => {
                info!(partner = %self.partner_id, "Connectivity interrupted, waiting for recovery");
            }
            other => {
                debug!(partner = %self.partner_id, state = ?other, "Connectivity changed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Signals from the partner
    // -----------------------------------------------------------------------

    /// Dispatch a relayed message. Messages from anyone but the partner are
    /// ignored.
    pub async fn handle_signal(&self, signal: SignalingMessage) -> Result<(), NegotiationError> {
        if signal.from_id != self.partner_id {
            debug!(from = %signal.from_id, partner = %self.partner_id, "Ignoring signal from non-partner");
            return Ok(());
        }

        match signal.kind {
            SignalKind::Offer => {
                let desc = parse_description(signal.payload, SdpKind::Offer)?;
                self.handle_remote_offer(desc).await.map(|_| ())
            }
            SignalKind::Answer => {
                let desc = parse_description(signal.payload, SdpKind::Answer)?;
                self.handle_answer(desc).await.map(|_| ())
            }
            SignalKind::Candidate => {
                let candidate = parse_payload::<IceCandidate>(signal.payload)?;
                self.handle_remote_candidate(candidate).await;
                Ok(())
            }
        }
    }

    pub async fn handle_remote_offer(
        &self,
        offer: SessionDescription,
    ) -> Result<OfferOutcome, NegotiationError> {
        let (epoch, rollback) = {
            let mut state = self.state.lock().await;
            if state.is_closed() {
                return Err(NegotiationError::SessionClosed);
            }
            let collision = state.collision();
            state.ignoring_offer = !self.role.is_polite() && collision;
            if state.ignoring_offer {
                debug!(partner = %self.partner_id, "Offer collision, keeping our own offer");
                return Ok(OfferOutcome::Ignored);
            }
            (state.epoch(), state.phase == SignalingPhase::HaveLocalOffer)
        };

        if rollback {
            debug!(partner = %self.partner_id, "Offer collision, rolling back our offer");
            self.transport.rollback().await?;
            let mut state = self.state.lock().await;
            self.ensure_current(&state, epoch)?;
            state.phase = SignalingPhase::Stable;
            state.renegotiation_pending = true;
        }

        if let Err(e) = self.transport.set_remote_description(&offer).await {
            warn!(partner = %self.partner_id, error = %e, "Failed to apply remote offer");
            return Err(e.into());
        }
        {
            let mut state = self.state.lock().await;
            self.ensure_current(&state, epoch)?;
            state.phase = SignalingPhase::HaveRemoteOffer;
            state.record_remote_description(offer.ice_ufrag());
        }

        let answer = self.with_warn("create answer", self.transport.create_answer().await)?;
        self.with_warn(
            "apply local answer",
            self.transport.set_local_description(&answer).await,
        )?;
        {
            let mut state = self.state.lock().await;
            self.ensure_current(&state, epoch)?;
            state.phase = SignalingPhase::Stable;
        }

        self.send_signal(SignalKind::Answer, &answer).await;
        self.flush_candidates(epoch).await;
        self.resume_renegotiation().await;
        Ok(OfferOutcome::Answered)
    }

    pub async fn handle_answer(
        &self,
        answer: SessionDescription,
    ) -> Result<AnswerOutcome, NegotiationError> {
        let epoch = {
            let state = self.state.lock().await;
            if state.is_closed() {
                return Err(NegotiationError::SessionClosed);
            }
            if state.phase != SignalingPhase::HaveLocalOffer {
                debug!(partner = %self.partner_id, phase = ?state.phase, "Ignoring stale answer");
                return Ok(AnswerOutcome::Stale);
            }
            state.epoch()
        };

        if let Err(e) = self.transport.set_remote_description(&answer).await {
            warn!(partner = %self.partner_id, error = %e, "Failed to apply remote answer");
            return Err(e.into());
        }
        {
            let mut state = self.state.lock().await;
            self.ensure_current(&state, epoch)?;
            state.phase = SignalingPhase::Stable;
            state.record_remote_description(answer.ice_ufrag());
        }

        self.flush_candidates(epoch).await;
        self.resume_renegotiation().await;
        Ok(AnswerOutcome::Applied)
    }

    /// Apply now if the applied remote description matches, else queue.
    pub async fn handle_remote_candidate(&self, candidate: IceCandidate) -> CandidateOutcome {
        {
            let mut state = self.state.lock().await;
            if state.is_closed() {
                return CandidateOutcome::Dropped;
            }
            if !state.accepts(&candidate) {
                debug!(
                    partner = %self.partner_id,
                    fragment = ?candidate.username_fragment,
                    "Queueing candidate until its description arrives"
                );
                state.queue(candidate);
                return CandidateOutcome::Queued;
            }
        }
        self.apply_candidate(&candidate).await
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Close the session: discard flags, queued candidates and descriptions,
    /// invalidate in-flight work, and close the transport. Idempotent.
    pub async fn teardown(&self) {
        {
            let mut state = self.state.lock().await;
            if state.is_closed() {
                return;
            }
            state.reset();
        }
        self.transport.close().await;
        info!(participant = %self.local_id, partner = %self.partner_id, "Negotiation session closed");
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// One offer attempt. A trigger that collides with an open offer is
    /// recorded as owed instead.
    async fn offer_once(&self) -> Result<OfferOutcome, NegotiationError> {
        let (epoch, generation) = {
            let mut state = self.state.lock().await;
            if state.is_closed() {
                return Err(NegotiationError::SessionClosed);
            }
            if state.collision() {
                debug!(partner = %self.partner_id, phase = ?state.phase, "Offer already in flight, coalescing");
                state.renegotiation_pending = true;
                return Ok(OfferOutcome::Coalesced);
            }
            state.making_offer = true;
            (state.epoch(), state.remote_generation)
        };

        let result = self.make_offer(epoch, generation).await;

        let mut state = self.state.lock().await;
        if state.epoch() == epoch {
            state.making_offer = false;
        }
        result
    }

    /// Send the owed offer if the session is back in `Stable`.
    async fn resume_renegotiation(&self) {
        loop {
            if !self.state.lock().await.take_renegotiation() {
                return;
            }
            debug!(partner = %self.partner_id, "Renegotiating deferred local change");
            if let Err(e) = self.offer_once().await {
                warn!(partner = %self.partner_id, error = %e, "Deferred renegotiation failed");
                return;
            }
        }
    }

    async fn make_offer(&self, epoch: u64, generation: u64) -> Result<OfferOutcome, NegotiationError> {
        let offer = self.with_warn("create offer", self.transport.create_offer().await)?;

        {
            let mut state = self.state.lock().await;
            if self.superseded(&mut state, epoch, generation) {
                return Ok(OfferOutcome::Abandoned);
            }
            state.phase = SignalingPhase::HaveLocalOffer;
        }

        if let Err(e) = self.transport.set_local_description(&offer).await {
            warn!(partner = %self.partner_id, error = %e, "Failed to apply local offer");
            let mut state = self.state.lock().await;
            if state.is_current(epoch) && state.phase == SignalingPhase::HaveLocalOffer {
                state.phase = SignalingPhase::Stable;
            }
            return Err(e.into());
        }

        {
            let mut state = self.state.lock().await;
            if self.superseded(&mut state, epoch, generation) {
                return Ok(OfferOutcome::Abandoned);
            }
        }

        self.send_signal(SignalKind::Offer, &offer).await;
        Ok(OfferOutcome::Sent)
    }

    /// True if a teardown or an accepted remote offer overtook the offer
    /// being produced. In the latter case the change is still owed.
    fn superseded(&self, state: &mut NegotiationState, epoch: u64, generation: u64) -> bool {
        if !state.is_current(epoch) {
            debug!(partner = %self.partner_id, "Session closed, abandoning offer");
            return true;
        }
        if state.remote_generation != generation {
            debug!(partner = %self.partner_id, "Remote offer won, abandoning ours");
            state.renegotiation_pending = true;
            return true;
        }
        false
    }

    async fn flush_candidates(&self, epoch: u64) {
        let ready = {
            let mut state = self.state.lock().await;
            if !state.is_current(epoch) {
                return;
            }
            state.take_applicable()
        };
        if !ready.is_empty() {
            debug!(partner = %self.partner_id, count = ready.len(), "Applying queued candidates");
        }
        for candidate in ready {
            if !self.state.lock().await.is_current(epoch) {
                return;
            }
            self.apply_candidate(&candidate).await;
        }
    }

    async fn apply_candidate(&self, candidate: &IceCandidate) -> CandidateOutcome {
        match self.transport.add_candidate(candidate).await {
            Ok(()) => CandidateOutcome::Applied,
            Err(TransportError::UnknownFragment(fragment)) => {
                debug!(partner = %self.partner_id, %fragment, "Candidate for unknown fragment, skipped");
                CandidateOutcome::Dropped
            }
            Err(e) => {
                warn!(partner = %self.partner_id, error = %e, "Failed to apply candidate");
                CandidateOutcome::Dropped
            }
        }
    }

    fn ensure_current(&self, state: &NegotiationState, epoch: u64) -> Result<(), NegotiationError> {
        if state.is_current(epoch) {
            Ok(())
        } else {
            debug!(partner = %self.partner_id, "Session closed mid-operation, discarding result");
            Err(NegotiationError::SessionClosed)
        }
    }

    fn with_warn<V>(&self, step: &str, result: Result<V, TransportError>) -> Result<V, NegotiationError> {
        result.map_err(|e| {
            warn!(partner = %self.partner_id, error = %e, "Failed to {step}");
            e.into()
        })
    }

    async fn send_signal<P: Serialize>(&self, kind: SignalKind, payload: &P) {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode signaling payload");
                return;
            }
        };
        self.emit(NegotiationEvent::Signal(SignalingMessage {
            kind,
            from_id: self.local_id.clone(),
            to_id: self.partner_id.clone(),
            payload,
        }))
        .await;
    }

    /// Never waits: the consumer may be the task driving this engine.
    async fn emit(&self, event: NegotiationEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(partner = %self.partner_id, "Negotiation event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(partner = %self.partner_id, "Negotiation events closed");
            }
        }
    }
}

fn parse_payload<P: DeserializeOwned>(payload: serde_json::Value) -> Result<P, NegotiationError> {
    serde_json::from_value(payload).map_err(|e| NegotiationError::MalformedPayload(e.to_string()))
}

fn parse_description(
    payload: serde_json::Value,
    expected: SdpKind,
) -> Result<SessionDescription, NegotiationError> {
    let desc: SessionDescription = parse_payload(payload)?;
    if desc.kind != expected {
        return Err(NegotiationError::MalformedPayload(format!(
            "expected {expected:?} description, got {:?}",
            desc.kind
        )));
    }
    Ok(desc)
}
