//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Duet Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[server]
# bind_address = "0.0.0.0"
# port = 3000                 # 1-65535
# hello_timeout_secs = 10     # 1-120
# channel_capacity = 256      # 8-65536

[presence]
# stale_after_secs = 300      # 30-86400
# reap_interval_secs = 60     # 5-3600
# name_prefix = "User"

[negotiation]
# ice_servers = [
#   "stun:stun.l.google.com:19302",
#   "stun:stun1.l.google.com:19302",
#   "stun:stun2.l.google.com:19302",
# ]

[logging]
# level = "info"              # trace, debug, info, warn, error
"##
    .to_string()
}
