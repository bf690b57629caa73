// crates/xpart-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for xpart-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::collections::BTreeMap;

use xpart_config::XpartConfig;

/// Parses a TOML string into an `XpartConfig` for tests.
pub fn config_from_toml(toml_str: &str) -> Result<XpartConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a minimal config with all defaults applied.
pub fn minimal_config() -> Result<XpartConfig, toml::de::Error> {
    config_from_toml("")
}

/// Returns an environment lookup backed by a fixed map.
pub fn env_lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let vars: BTreeMap<String, String> =
        pairs.iter().map(|(name, value)| ((*name).to_string(), (*value).to_string())).collect();
    move |name| vars.get(name).cloned()
}
