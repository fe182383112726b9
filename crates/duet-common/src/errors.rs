use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Why a pairing request was refused. Rejections never mutate state and
/// are never reported to either participant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingRejection {
    #[error("participant cannot engage with itself")]
    SelfEngagement,

    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("requester {0} is already engaged")]
    RequesterEngaged(String),

    #[error("target {0} is already engaged")]
    TargetEngaged(String),

    #[error("participant {0} is not engaged")]
    NotEngaged(String),
}

/// Failures reported by the external media transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The candidate references a credential fragment the transport has
    /// not seen yet. Expected while a description is still in flight.
    #[error("unknown credential fragment: {0}")]
    UnknownFragment(String),

    #[error("transport rejected operation: {0}")]
    Rejected(String),

    #[error("transport is closed")]
    Closed,

    #[error("local capture unavailable: {0}")]
    CaptureUnavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("negotiation session is closed")]
    SessionClosed,

    #[error("malformed signaling payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DuetError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pairing(#[from] PairingRejection),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}
