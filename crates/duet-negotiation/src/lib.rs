//! Participant-side runtime for duet voice sessions.
//!
//! Provides:
//! - `NegotiationEngine`: the per-session perfect-negotiation state machine
//! - `MediaSessionController`: local microphone control with renegotiation
//! - `CallRuntime`: glue between relay frames, the engine and the UI
//! - `SignalingClient`: the WebSocket connection to the relay
//!
//! The media transport itself is external and plugs in through
//! `MediaTransport`, `CaptureSource` and `TransportFactory`.

pub mod client;
pub mod engine;
pub mod media;
pub mod runtime;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{SignalingClient, SignalingConfig};
pub use engine::NegotiationEngine;
pub use media::MediaSessionController;
pub use runtime::{CallEvent, CallRuntime};
pub use transport::{CaptureSource, MediaTransport, TransportFactory};
pub use types::{
    AnswerOutcome, AudioTrack, CandidateOutcome, ConnectivityState, IceCandidate,
    NegotiationEvent, NegotiationSnapshot, OfferOutcome, SdpKind, SessionDescription,
    SignalingPhase,
};
