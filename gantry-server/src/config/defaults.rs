//! Default configuration values
//!
//! These are embedded in the binary and used when no config file exists.

/// Default configuration as TOML (for reference/documentation)
#[allow(dead_code)]
pub const DEFAULT_CONFIG_TOML: &str = r##"
# gantry controller configuration

[general]
# How long a session coalesces rapid writes to one key before sending
# them to the controller, in milliseconds.
debounce_ms = 300

[network]
# Accept tablet/browser sessions over TCP in addition to the local
# unix socket. Keep disabled unless the machine is on a trusted network.
enabled = false
listen_addr = "0.0.0.0:8372"
"##;
