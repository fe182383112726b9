//! Presence registry configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Participants with no activity for this long are reaped (30-86400).
    pub stale_after_secs: u32,
    /// How often the reaper runs (5-3600).
    pub reap_interval_secs: u32,
    /// Prefix for generated display names, e.g. `User417`.
    pub name_prefix: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 300,
            reap_interval_secs: 60,
            name_prefix: "User".into(),
        }
    }
}
