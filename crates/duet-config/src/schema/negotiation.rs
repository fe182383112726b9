//! Client-side negotiation settings.

use serde::{Deserialize, Serialize};

/// Settings handed to participant runtimes when they build a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// STUN/TURN server URLs offered to the media transport.
    pub ice_servers: Vec<String>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
                "stun:stun2.l.google.com:19302".into(),
            ],
        }
    }
}
