//! Config file loading tests for xpart-config.
// crates/xpart-config/tests/load_validation.rs
// =============================================================================
// Module: Config Loading Tests
// Description: Validate path resolution, file limits, and secret handling.
// Purpose: Ensure loading fails closed and connection strings stay hidden.
// =============================================================================

#![allow(clippy::use_debug, reason = "Debug output is inspected for redaction.")]

use std::fs;

use tempfile::TempDir;
use xpart_config::ConfigError;
use xpart_config::StoreKind;
use xpart_config::XpartConfig;

mod common;

type TestResult = Result<(), String>;

fn write_config(dir: &TempDir, name: &str, content: &str) -> Result<std::path::PathBuf, String> {
    let path = dir.path().join(name);
    fs::write(&path, content).map_err(|err| err.to_string())?;
    Ok(path)
}

#[test]
fn loads_explicit_path() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(
        &dir,
        "custom.toml",
        r#"
[server]
bind = "0.0.0.0:8080"
route_prefix = ""

[store]
kind = "memory"
collection = "Orders"

[feed]
max_item_count = 10
max_degree_of_parallelism = 4

[[aggregates]]
name = "OrdersByRegion"
query_param = "region"
attribute = "address.region"
"#,
    )?;
    let config = XpartConfig::load_with(Some(path.as_path()), common::env_lookup(&[]))
        .map_err(|err| err.to_string())?;
    if config.store.kind != StoreKind::Memory || config.store.collection != "Orders" {
        return Err("store section not applied".to_string());
    }
    if config.feed.max_degree_of_parallelism != Some(4) {
        return Err("feed section not applied".to_string());
    }
    if config.aggregates.len() != 1 || config.aggregates[0].attribute != "address.region" {
        return Err("explicit aggregates should replace the defaults".to_string());
    }
    Ok(())
}

#[test]
fn env_var_names_the_config_path() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(&dir, "env.toml", "[loader]\nbatch_count = 3\n")?;
    let path_text = path.to_string_lossy().to_string();
    let config = XpartConfig::load_with(None, common::env_lookup(&[("XPART_CONFIG", path_text.as_str())]))
        .map_err(|err| err.to_string())?;
    if config.loader.batch_count != 3 {
        return Err("config from XPART_CONFIG not applied".to_string());
    }
    Ok(())
}

#[test]
fn explicit_missing_file_is_an_io_error() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let missing = dir.path().join("absent.toml");
    match XpartConfig::load_with(Some(missing.as_path()), common::env_lookup(&[])) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got ok={}", other.is_ok())),
    }
}

#[test]
fn parse_errors_are_reported() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(&dir, "bad.toml", "[server\nbind = 1")?;
    match XpartConfig::load_with(Some(path.as_path()), common::env_lookup(&[])) {
        Err(ConfigError::Parse(_)) => Ok(()),
        _ => Err("expected parse error".to_string()),
    }
}

#[test]
fn invalid_values_fail_validation_on_load() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(&dir, "invalid.toml", "[feed]\nmax_item_count = 0\n")?;
    match XpartConfig::load_with(Some(path.as_path()), common::env_lookup(&[])) {
        Err(ConfigError::Invalid(message)) if message.contains("feed.max_item_count") => Ok(()),
        _ => Err("expected feed validation error".to_string()),
    }
}

#[test]
fn oversized_file_rejected() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let padding = "#".repeat(1024 * 1024 + 1);
    let path = write_config(&dir, "huge.toml", &padding)?;
    match XpartConfig::load_with(Some(path.as_path()), common::env_lookup(&[])) {
        Err(ConfigError::Invalid(message)) if message.contains("size limit") => Ok(()),
        _ => Err("expected size limit error".to_string()),
    }
}

#[test]
fn non_utf8_file_rejected() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("latin1.toml");
    fs::write(&path, [0xff_u8, 0xfe, 0x00]).map_err(|err| err.to_string())?;
    match XpartConfig::load_with(Some(path.as_path()), common::env_lookup(&[])) {
        Err(ConfigError::Invalid(message)) if message.contains("utf-8") => Ok(()),
        _ => Err("expected utf-8 error".to_string()),
    }
}

#[test]
fn overlong_path_component_rejected() -> TestResult {
    let long = "a".repeat(300);
    let path = std::path::PathBuf::from(long);
    match XpartConfig::load_with(Some(path.as_path()), common::env_lookup(&[])) {
        Err(ConfigError::Invalid(message)) if message.contains("component") => Ok(()),
        _ => Err("expected path component error".to_string()),
    }
}

#[test]
fn inline_connection_string_wins_over_env() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    let lookup = common::env_lookup(&[(
        "XPART_CONNECTION_STRING",
        "AccountEndpoint=https://env.example/;AccountKey=env",
    )]);
    let source = config.store.connection_source_with(&lookup);
    if source.label() != "XPART_CONNECTION_STRING" {
        return Err(format!("unexpected label {}", source.label()));
    }
    if source.resolve().map_err(|err| err.to_string())?.contains("inline") {
        return Err("env value expected".to_string());
    }

    config.store.connection_string =
        Some("AccountEndpoint=https://inline.example/;AccountKey=inline".to_string());
    let source = config.store.connection_source_with(&lookup);
    if !source.resolve().map_err(|err| err.to_string())?.contains("inline.example") {
        return Err("inline value expected".to_string());
    }
    Ok(())
}

#[test]
fn missing_connection_string_surfaces_on_resolve() -> TestResult {
    let config = common::minimal_config().map_err(|err| err.to_string())?;
    let source = config.store.connection_source_with(common::env_lookup(&[]));
    match source.resolve() {
        Err(err) if err.to_string().contains("XPART_CONNECTION_STRING") => Ok(()),
        _ => Err("expected undefined connection string error".to_string()),
    }
}

#[test]
fn store_debug_redacts_inline_connection_string() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.connection_string =
        Some("AccountEndpoint=https://inline.example/;AccountKey=s3cr3t".to_string());
    let rendered = format!("{:?}", config.store);
    if rendered.contains("s3cr3t") {
        return Err("store debug output leaked the key".to_string());
    }
    Ok(())
}
