//! In-memory transport and capture doubles for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duet_common::TransportError;

use crate::transport::{CaptureSource, MediaTransport, TransportFactory};
use crate::types::{AudioTrack, IceCandidate, SdpKind, SessionDescription};

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<&'static str>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    applied: Vec<IceCandidate>,
    tracks: Vec<AudioTrack>,
    offers_created: usize,
    closed: bool,
    reject_remote: bool,
}

/// Records every call. Descriptions carry `a=ice-ufrag:{ufrag}`; a
/// candidate is accepted only if it matches the applied remote fragment.
#[derive(Debug)]
pub struct FakeTransport {
    ufrag: String,
    inner: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn new(ufrag: &str) -> Arc<Self> {
        Arc::new(Self {
            ufrag: ufrag.to_string(),
            inner: Mutex::new(FakeState::default()),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn called(&self, name: &str) -> bool {
        self.state().calls.iter().any(|c| *c == name)
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.state().applied.clone()
    }

    pub fn tracks(&self) -> Vec<AudioTrack> {
        self.state().tracks.clone()
    }

    pub fn offers_created(&self) -> usize {
        self.state().offers_created
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state().local.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state().remote.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Make every following `set_remote_description` fail.
    pub fn reject_remote_descriptions(&self) {
        self.state().reject_remote = true;
    }

    fn describe(&self, kind: SdpKind, n: usize) -> SessionDescription {
        SessionDescription {
            kind,
            sdp: format!(
                "v=0\r\no=- {n} 0 IN IP4 127.0.0.1\r\na=ice-ufrag:{}\r\na=ice-pwd:secret\r\n",
                self.ufrag
            ),
        }
    }

    fn check_open(state: &FakeState) -> Result<(), TransportError> {
        if state.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MediaTransport for FakeTransport {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        // Suspend like a real transport so concurrent triggers interleave.
        tokio::task::yield_now().await;
        let mut state = self.state();
        Self::check_open(&state)?;
        state.calls.push("create_offer");
        state.offers_created += 1;
        let n = state.offers_created;
        Ok(self.describe(SdpKind::Offer, n))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        Self::check_open(&state)?;
        state.calls.push("create_answer");
        Ok(self.describe(SdpKind::Answer, 0))
    }

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<(), TransportError> {
        let mut state = self.state();
        Self::check_open(&state)?;
        state.calls.push("set_local_description");
        state.local = Some(desc.clone());
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<(), TransportError> {
        let mut state = self.state();
        Self::check_open(&state)?;
        state.calls.push("set_remote_description");
        if state.reject_remote {
            return Err(TransportError::Rejected("malformed description".into()));
        }
        state.remote = Some(desc.clone());
        Ok(())
    }

    async fn rollback(&self) -> Result<(), TransportError> {
        let mut state = self.state();
        Self::check_open(&state)?;
        state.calls.push("rollback");
        state.local = None;
        Ok(())
    }

    async fn add_candidate(&self, candidate: &IceCandidate) -> Result<(), TransportError> {
        let mut state = self.state();
        Self::check_open(&state)?;
        state.calls.push("add_candidate");
        let remote_fragment = state.remote.as_ref().and_then(|d| d.ice_ufrag());
        match (&candidate.username_fragment, remote_fragment) {
            (Some(wanted), Some(have)) if *wanted == have => {}
            (None, Some(_)) => {}
            (Some(wanted), _) => return Err(TransportError::UnknownFragment(wanted.clone())),
            (None, None) => return Err(TransportError::UnknownFragment(String::new())),
        }
        state.applied.push(candidate.clone());
        Ok(())
    }

    async fn attach_track(&self, track: &AudioTrack) -> Result<(), TransportError> {
        let mut state = self.state();
        Self::check_open(&state)?;
        state.calls.push("attach_track");
        state.tracks.push(track.clone());
        Ok(())
    }

    async fn detach_track(&self, track: &AudioTrack) -> Result<(), TransportError> {
        let mut state = self.state();
        Self::check_open(&state)?;
        state.calls.push("detach_track");
        state.tracks.retain(|t| t != track);
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.state();
        state.calls.push("close");
        state.closed = true;
    }
}

/// Hands out `FakeTransport`s and keeps them for inspection.
#[derive(Debug)]
pub struct FakeFactory {
    ufrag: String,
    created: Mutex<Vec<Arc<FakeTransport>>>,
    fail: AtomicBool,
}

impl FakeFactory {
    pub fn new(ufrag: &str) -> Self {
        Self {
            ufrag: ufrag.to_string(),
            created: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<Arc<FakeTransport>> {
        self.created.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<FakeTransport> {
        self.created.lock().unwrap().last().cloned().unwrap()
    }
}

impl TransportFactory for FakeFactory {
    type Transport = FakeTransport;

    fn create(&self, _ice_servers: &[String]) -> Result<Arc<FakeTransport>, TransportError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Rejected("no transport".into()));
        }
        let transport = FakeTransport::new(&self.ufrag);
        self.created.lock().unwrap().push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// Hands out numbered microphone tracks.
#[derive(Debug, Default)]
pub struct FakeCapture {
    opened: AtomicUsize,
    closed: AtomicUsize,
    unavailable: AtomicBool,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSource for FakeCapture {
    async fn open(&self) -> Result<AudioTrack, TransportError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::CaptureUnavailable("no microphone".into()));
        }
        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AudioTrack {
            id: format!("mic-{n}"),
        })
    }

    async fn close(&self, _track: &AudioTrack) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
