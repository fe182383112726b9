//! Full configuration validation.
//!
//! Each section has its own check; this orchestrator calls them all and
//! collects errors into a single `ConfigError`.

mod helpers;

#[cfg(test)]
mod tests;

use crate::schema::DuetConfig;
use duet_common::ConfigError;

use helpers::validate_range;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &DuetConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_server(&mut errors, config);
    validate_presence(&mut errors, config);
    validate_negotiation(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_server(errors: &mut Vec<String>, config: &DuetConfig) {
    if config.server.bind_address.trim().is_empty() {
        errors.push("server.bind_address must not be empty".into());
    }
    validate_range(errors, "server.port", config.server.port, 1, 65535);
    validate_range(
        errors,
        "server.hello_timeout_secs",
        config.server.hello_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "server.channel_capacity",
        config.server.channel_capacity,
        8,
        65536,
    );
}

fn validate_presence(errors: &mut Vec<String>, config: &DuetConfig) {
    validate_range(
        errors,
        "presence.stale_after_secs",
        config.presence.stale_after_secs,
        30,
        86400,
    );
    validate_range(
        errors,
        "presence.reap_interval_secs",
        config.presence.reap_interval_secs,
        5,
        3600,
    );

    let prefix = &config.presence.name_prefix;
    if prefix.is_empty() || prefix.chars().count() > 16 {
        errors.push(format!(
            "presence.name_prefix = {prefix:?} must be 1-16 characters"
        ));
    }
}

fn validate_negotiation(errors: &mut Vec<String>, config: &DuetConfig) {
    for url in &config.negotiation.ice_servers {
        let known = ["stun:", "turn:", "turns:"]
            .iter()
            .any(|scheme| url.starts_with(scheme));
        if !known {
            errors.push(format!(
                "negotiation.ice_servers entry {url:?} must use stun:, turn: or turns:"
            ));
        }
    }
}
