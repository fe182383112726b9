//! Tests for the full validation pipeline.

use super::*;
use crate::schema::DuetConfig;

#[test]
fn default_config_validates() {
    let config = DuetConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_port_zero() {
    let mut config = DuetConfig::default();
    config.server.port = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("server.port"));
}

#[test]
fn catches_port_above_u16() {
    let mut config = DuetConfig::default();
    config.server.port = 70000;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("server.port"));
}

#[test]
fn catches_empty_bind_address() {
    let mut config = DuetConfig::default();
    config.server.bind_address = "  ".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("server.bind_address"));
}

#[test]
fn catches_tiny_channel_capacity() {
    let mut config = DuetConfig::default();
    config.server.channel_capacity = 1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("server.channel_capacity"));
}

#[test]
fn catches_stale_after_too_short() {
    let mut config = DuetConfig::default();
    config.presence.stale_after_secs = 5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.stale_after_secs"));
}

#[test]
fn catches_empty_name_prefix() {
    let mut config = DuetConfig::default();
    config.presence.name_prefix = String::new();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.name_prefix"));
}

#[test]
fn catches_unknown_ice_scheme() {
    let mut config = DuetConfig::default();
    config.negotiation.ice_servers.push("http://example.com".into());
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("negotiation.ice_servers"));
}

#[test]
fn accepts_turn_servers() {
    let mut config = DuetConfig::default();
    config.negotiation.ice_servers = vec!["turns:turn.example.com:5349".into()];
    assert!(validate(&config).is_ok());
}

#[test]
fn collects_multiple_errors() {
    let mut config = DuetConfig::default();
    config.server.port = 0;
    config.presence.reap_interval_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("server.port"));
    assert!(err.contains("presence.reap_interval_secs"));
}
