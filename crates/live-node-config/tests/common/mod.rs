// crates/live-node-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for live-node-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use live_node_config::LiveNodeConfig;

/// Minimal valid configuration using the filesystem object store.
pub const MINIMAL_TOML: &str = r#"
[node]
name = "node-1"
storage_dir = "/var/lib/live"

[broker]
uri = "amqp://127.0.0.1:5672/%2f"

[object_store]
provider = "filesystem"
root = "/srv/objects"
"#;

/// Parses a TOML string into a `LiveNodeConfig` without validating it.
pub fn config_from_toml(toml_str: &str) -> Result<LiveNodeConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns the minimal configuration with defaults applied.
pub fn minimal_config() -> Result<LiveNodeConfig, toml::de::Error> {
    config_from_toml(MINIMAL_TOML)
}
