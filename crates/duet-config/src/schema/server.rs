//! Relay server listener configuration.

use serde::{Deserialize, Serialize};

/// WebSocket listener settings for the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Listen port (valid range: 1-65535).
    pub port: u32,
    /// Seconds a new connection has to send its `join`/`rejoin` frame.
    pub hello_timeout_secs: u32,
    /// Outbound queue depth per connected participant.
    pub channel_capacity: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 3000,
            hello_timeout_secs: 10,
            channel_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// `address:port` string suitable for `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
