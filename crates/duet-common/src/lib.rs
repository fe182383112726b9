pub mod errors;
pub mod id;
pub mod protocol;

pub use errors::{ConfigError, DuetError, NegotiationError, PairingRejection, TransportError};
pub use id::{new_id, Role};
pub use protocol::{
    ClientMessage, PresenceEntry, ServerMessage, SignalKind, SignalingMessage,
};

pub type Result<T> = std::result::Result<T, DuetError>;
