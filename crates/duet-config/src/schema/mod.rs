//! Configuration schema types for Duet.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod negotiation;
mod presence;
mod server;
mod system;

pub use negotiation::*;
pub use presence::*;
pub use server::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration shared by the relay server and participant runtimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct DuetConfig {
    pub server: ServerConfig,
    pub presence: PresenceConfig,
    pub negotiation: NegotiationConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
