//! Duet configuration system.
//!
//! TOML-based configuration for the relay server and participant
//! runtimes. Every section has defaults so partial configs work out of
//! the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use duet_config::load_config;
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("listening on {}", config.server.listen_addr());
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    DuetConfig, LogLevel, LoggingConfig, NegotiationConfig, PresenceConfig, ServerConfig,
    CONFIG_SCHEMA_VERSION,
};

use std::path::Path;

use duet_common::ConfigError;

/// Load config from `path` when given, otherwise from the platform
/// default location, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<DuetConfig, ConfigError> {
    let config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &DuetConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
