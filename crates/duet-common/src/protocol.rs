//! Wire protocol between participant runtimes and the relay server.
//!
//! Every frame is a JSON text message internally tagged by `type`. The
//! relay only interprets the envelope; negotiation payloads are forwarded
//! verbatim.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// Kind of negotiation message carried between two engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

/// A negotiation message addressed from one participant to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingMessage {
    pub kind: SignalKind,
    pub from_id: String,
    pub to_id: String,
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// One row of the presence list broadcast to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub id: String,
    pub name: String,
    pub engaged_with: Option<String>,
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request a fresh identity. Must be the first frame unless rejoining.
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    /// Reclaim a previously issued identity.
    Rejoin { participant_id: String },
    ToggleEngagement { target_id: String },
    ReleaseEngagement,
    Offer {
        to_id: String,
        payload: serde_json::Value,
    },
    Answer {
        to_id: String,
        payload: serde_json::Value,
    },
    Candidate {
        to_id: String,
        payload: serde_json::Value,
    },
    MicState { mic_on: bool },
}

impl ClientMessage {
    /// Build the outbound frame for a signaling message. The sender id is
    /// not sent; the relay stamps it from the connection's identity.
    pub fn from_signal(signal: SignalingMessage) -> Self {
        let SignalingMessage {
            kind, to_id, payload, ..
        } = signal;
        match kind {
            SignalKind::Offer => ClientMessage::Offer { to_id, payload },
            SignalKind::Answer => ClientMessage::Answer { to_id, payload },
            SignalKind::Candidate => ClientMessage::Candidate { to_id, payload },
        }
    }

    /// Interpret this frame as a signaling message sent by `from_id`.
    pub fn into_signal(self, from_id: &str) -> Option<SignalingMessage> {
        let (kind, to_id, payload) = match self {
            ClientMessage::Offer { to_id, payload } => (SignalKind::Offer, to_id, payload),
            ClientMessage::Answer { to_id, payload } => (SignalKind::Answer, to_id, payload),
            ClientMessage::Candidate { to_id, payload } => {
                (SignalKind::Candidate, to_id, payload)
            }
            _ => return None,
        };
        Some(SignalingMessage {
            kind,
            from_id: from_id.to_string(),
            to_id,
            payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Joined {
        participant_id: String,
        display_name: String,
    },
    PresenceList {
        participants: Vec<PresenceEntry>,
    },
    Paired {
        partner_id: String,
    },
    Released {
        partner_id: String,
    },
    Offer {
        from_id: String,
        to_id: String,
        payload: serde_json::Value,
    },
    Answer {
        from_id: String,
        to_id: String,
        payload: serde_json::Value,
    },
    Candidate {
        from_id: String,
        to_id: String,
        payload: serde_json::Value,
    },
    MicState {
        participant_id: String,
        mic_on: bool,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// Extract the signaling message if this frame is a relayed one.
    pub fn into_signal(self) -> Option<SignalingMessage> {
        let (kind, from_id, to_id, payload) = match self {
            ServerMessage::Offer {
                from_id,
                to_id,
                payload,
            } => (SignalKind::Offer, from_id, to_id, payload),
            ServerMessage::Answer {
                from_id,
                to_id,
                payload,
            } => (SignalKind::Answer, from_id, to_id, payload),
            ServerMessage::Candidate {
                from_id,
                to_id,
                payload,
            } => (SignalKind::Candidate, from_id, to_id, payload),
            _ => return None,
        };
        Some(SignalingMessage {
            kind,
            from_id,
            to_id,
            payload,
        })
    }
}

impl From<SignalingMessage> for ServerMessage {
    fn from(signal: SignalingMessage) -> Self {
        let SignalingMessage {
            kind,
            from_id,
            to_id,
            payload,
        } = signal;
        match kind {
            SignalKind::Offer => ServerMessage::Offer {
                from_id,
                to_id,
                payload,
            },
            SignalKind::Answer => ServerMessage::Answer {
                from_id,
                to_id,
                payload,
            },
            SignalKind::Candidate => ServerMessage::Candidate {
                from_id,
                to_id,
                payload,
            },
        }
    }
}
