//! Session descriptions, candidates, and the states and outcomes of a
//! negotiation.

use duet_common::SignalingMessage;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Descriptions and candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An offer or answer as produced by the media transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Credential fragment from the first `a=ice-ufrag:` line, if any.
    pub fn ice_ufrag(&self) -> Option<String> {
        self.sdp
            .lines()
            .find_map(|line| line.trim().strip_prefix("a=ice-ufrag:"))
            .map(|ufrag| ufrag.trim().to_string())
            .filter(|ufrag| !ufrag.is_empty())
    }
}

/// A network path descriptor discovered by one side's transport. Field
/// names match the browser's `RTCIceCandidateInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
    /// Fragment of the description this candidate belongs to.
    #[serde(default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>, username_fragment: Option<&str>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
            username_fragment: username_fragment.map(str::to_string),
        }
    }
}

/// Handle to a local or remote audio track owned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioTrack {
    pub id: String,
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Signaling phase of one side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalingPhase {
    #[default]
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

/// Connectivity as reported by the media transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    New,
    Checking,
    Connected,
    /// Transient; the transport may recover on its own.
    Disconnected,
    /// Terminal.
    Failed,
    Closed,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to a local offer attempt or an incoming offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Local offer produced, applied and sent.
    Sent,
    /// Another local offer was already in flight.
    Coalesced,
    /// Session torn down, or a remote offer accepted, while producing.
    Abandoned,
    /// Remote offer applied and answered.
    Answered,
    /// Remote offer dropped to resolve a collision.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Applied,
    /// No local offer was outstanding.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Applied,
    /// Held until a description with a matching fragment is applied.
    Queued,
    Dropped,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Emitted by a negotiation engine for its owner to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationEvent {
    /// Send this message to the partner via the relay.
    Signal(SignalingMessage),
    RemoteStreamReady {
        partner_id: String,
        track_id: String,
    },
    /// Connectivity failed for good. The engine has already torn down.
    SessionFailed { partner_id: String, reason: String },
}

/// Point-in-time view of an engine's negotiation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationSnapshot {
    pub phase: SignalingPhase,
    pub making_offer: bool,
    pub ignoring_offer: bool,
    pub remote_fragment: Option<String>,
    pub pending_candidates: usize,
    /// A local change is waiting for the open offer to settle.
    pub renegotiation_pending: bool,
}
