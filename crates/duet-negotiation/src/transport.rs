//! Collaborator boundaries: the media transport, local capture, and the
//! factory that builds one transport per session.

use std::sync::Arc;

use async_trait::async_trait;
use duet_common::TransportError;

use crate::types::{AudioTrack, IceCandidate, SessionDescription};

/// Primitive operations of a peer media transport. Notifications flow the
/// other way, into `NegotiationEngine::on_*`.
#[async_trait]
pub trait MediaTransport: Send + Sync + 'static {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<(), TransportError>;

    async fn set_remote_description(&self, desc: &SessionDescription)
        -> Result<(), TransportError>;

    /// Discard an applied but unanswered local offer.
    async fn rollback(&self) -> Result<(), TransportError>;

    /// Fails with `TransportError::UnknownFragment` if the candidate's
    /// fragment matches no applied remote description.
    async fn add_candidate(&self, candidate: &IceCandidate) -> Result<(), TransportError>;

    async fn attach_track(&self, track: &AudioTrack) -> Result<(), TransportError>;

    async fn detach_track(&self, track: &AudioTrack) -> Result<(), TransportError>;

    async fn close(&self);
}

/// Source of the local microphone track.
#[async_trait]
pub trait CaptureSource: Send + Sync + 'static {
    /// Fails with `TransportError::CaptureUnavailable` when the device
    /// cannot be opened.
    async fn open(&self) -> Result<AudioTrack, TransportError>;

    async fn close(&self, track: &AudioTrack);
}

/// Builds a fresh transport for every session. Transports are never
/// reused across sessions.
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: MediaTransport;

    fn create(&self, ice_servers: &[String]) -> Result<Arc<Self::Transport>, TransportError>;
}

#[async_trait]
impl<C: CaptureSource> CaptureSource for Arc<C> {
    async fn open(&self) -> Result<AudioTrack, TransportError> {
        (**self).open().await
    }

    async fn close(&self, track: &AudioTrack) {
        (**self).close(track).await
    }
}

impl<F: TransportFactory> TransportFactory for Arc<F> {
    type Transport = F::Transport;

    fn create(&self, ice_servers: &[String]) -> Result<Arc<F::Transport>, TransportError> {
        (**self).create(ice_servers)
    }
}
