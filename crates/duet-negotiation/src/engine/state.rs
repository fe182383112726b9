//! Per-session negotiation state owned by one engine.

use crate::types::{IceCandidate, NegotiationSnapshot, SignalingPhase};

#[derive(Debug, Default)]
pub(crate) struct NegotiationState {
    pub(crate) phase: SignalingPhase,
    /// True only while a local offer is being produced and applied.
    pub(crate) making_offer: bool,
    /// True after the last remote offer was dropped to resolve glare.
    pub(crate) ignoring_offer: bool,
    /// Fragment of the applied remote description.
    pub(crate) remote_fragment: Option<String>,
    pub(crate) has_remote_description: bool,
    /// Bumped whenever a remote description is applied. A local offer
    /// produced across a bump is stale.
    pub(crate) remote_generation: u64,
    /// A local change arrived while an offer was open, or our offer was
    /// rolled back or abandoned. Owed one offer once back in `Stable`.
    pub(crate) renegotiation_pending: bool,
    pending: Vec<IceCandidate>,
    /// Bumped on teardown. In-flight work started under an older epoch is
    /// discarded.
    epoch: u64,
}

impl NegotiationState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.phase == SignalingPhase::Closed
    }

    /// True if work started at `epoch` may still commit.
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && !self.is_closed()
    }

    pub(crate) fn collision(&self) -> bool {
        self.making_offer || self.phase != SignalingPhase::Stable
    }

    /// A candidate without a fragment matches any applied description.
    pub(crate) fn accepts(&self, candidate: &IceCandidate) -> bool {
        if !self.has_remote_description {
            return false;
        }
        match candidate.username_fragment.as_deref() {
            None => true,
            Some(fragment) => self.remote_fragment.as_deref() == Some(fragment),
        }
    }

    /// Clear and return the owed renegotiation, but only once no offer is
    /// open. Otherwise it stays owed.
    pub(crate) fn take_renegotiation(&mut self) -> bool {
        if self.is_closed() || self.collision() {
            return false;
        }
        std::mem::take(&mut self.renegotiation_pending)
    }

    pub(crate) fn queue(&mut self, candidate: IceCandidate) {
        self.pending.push(candidate);
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Remove and return, in arrival order, every queued candidate the
    /// current remote description accepts. The rest stay queued.
    pub(crate) fn take_applicable(&mut self) -> Vec<IceCandidate> {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|c| self.accepts(c));
        self.pending = waiting;
        ready
    }

    pub(crate) fn record_remote_description(&mut self, fragment: Option<String>) {
        self.remote_fragment = fragment;
        self.has_remote_description = true;
        self.remote_generation += 1;
    }

    /// Close the session and drop everything attached to it.
    pub(crate) fn reset(&mut self) {
        let epoch = self.epoch + 1;
        *self = Self {
            phase: SignalingPhase::Closed,
            epoch,
            ..Self::default()
        };
    }

    pub(crate) fn snapshot(&self) -> NegotiationSnapshot {
        NegotiationSnapshot {
            phase: self.phase,
            making_offer: self.making_offer,
            ignoring_offer: self.ignoring_offer,
            remote_fragment: self.remote_fragment.clone(),
            pending_candidates: self.pending.len(),
            renegotiation_pending: self.renegotiation_pending,
        }
    }
}
