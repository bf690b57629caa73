//! Config defaults and core validation tests for xpart-config.
// crates/xpart-config/tests/config_defaults.rs
// =============================================================================
// Module: Config Defaults and Core Validation Tests
// Description: Validate default behavior and core config invariants.
// Purpose: Ensure minimal config is valid and critical invariants are enforced.
// =============================================================================

use xpart_config::AggregateConfig;
use xpart_config::ConfigError;
use xpart_config::StoreKind;
use xpart_core::QueryScope;

mod common;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

#[test]
fn default_config_validates() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())?;
    if config != xpart_config::XpartConfig::default() {
        return Err("empty toml should equal built-in defaults".to_string());
    }
    Ok(())
}

#[test]
fn defaults_match_the_reference_deployment() -> TestResult {
    let config = common::minimal_config().map_err(|err| err.to_string())?;
    let collection = config.store.collection_ref().map_err(|err| err.to_string())?;
    if collection.resource_link() != "dbs/TestDB/colls/Items" {
        return Err(format!("unexpected collection {collection}"));
    }
    if config.store.kind != StoreKind::Http || config.store.allow_http {
        return Err("store should default to https".to_string());
    }
    if config.feed.max_item_count != 50 || config.feed.max_buffered_item_count != 100 {
        return Err("unexpected feed defaults".to_string());
    }
    if config.feed.max_degree_of_parallelism.is_some() {
        return Err("parallelism should default to unbounded".to_string());
    }
    if config.loader.batch_count != 10 || config.loader.documents_per_batch != 1_000 {
        return Err("unexpected loader defaults".to_string());
    }
    if config.store.retry.max_attempts_on_throttled != 9 || config.store.retry.max_wait_ms != 30_000 {
        return Err("unexpected retry defaults".to_string());
    }
    Ok(())
}

#[test]
fn default_aggregates_scope_by_partition_key() -> TestResult {
    let config = common::minimal_config().map_err(|err| err.to_string())?;
    let dimensions = config.dimensions().map_err(|err| err.to_string())?;
    let names: Vec<_> = dimensions.iter().map(|dimension| dimension.name().to_string()).collect();
    if names != ["ItemCountByCustomer", "ItemCountByProduct"] {
        return Err(format!("unexpected aggregates {}", names.join(",")));
    }
    if !dimensions[0].is_partition_key() || dimensions[1].is_partition_key() {
        return Err("only the customer aggregate is partition-scoped".to_string());
    }
    if dimensions[1].select_scope(Some("12")) != QueryScope::CrossPartition {
        return Err("product filter must fan out".to_string());
    }
    Ok(())
}

#[test]
fn bind_must_be_socket_address() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.server.bind = "localhost".to_string();
    assert_invalid(config.validate(), "server.bind")
}

#[test]
fn route_prefix_shape_enforced() -> TestResult {
    for prefix in ["api", "/api/", "/a pi", "/api//v1"] {
        let mut config = common::minimal_config().map_err(|err| err.to_string())?;
        config.server.route_prefix = prefix.to_string();
        assert_invalid(config.validate(), "server.route_prefix")?;
    }
    for prefix in ["", "/api", "/v1/counts"] {
        let mut config = common::minimal_config().map_err(|err| err.to_string())?;
        config.server.route_prefix = prefix.to_string();
        config.validate().map_err(|err| format!("{prefix}: {err}"))?;
    }
    Ok(())
}

#[test]
fn collection_ids_reject_reserved_characters() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.collection = "Items/../x".to_string();
    assert_invalid(config.validate(), "store")
}

#[test]
fn partition_key_must_be_identifier_path() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.partition_key = "customer id".to_string();
    assert_invalid(config.validate(), "store.partition_key")
}

#[test]
fn timeouts_are_bounded() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.connect_timeout_ms = 10;
    assert_invalid(config.validate(), "store.connect_timeout_ms")?;
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.request_timeout_ms = 1_000_000;
    assert_invalid(config.validate(), "store.request_timeout_ms")
}

#[test]
fn feed_page_size_is_bounded() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.feed.max_item_count = 0;
    assert_invalid(config.validate(), "feed.max_item_count")?;
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.feed.max_degree_of_parallelism = Some(0);
    assert_invalid(config.validate(), "feed.max_degree_of_parallelism")
}

#[test]
fn aggregates_must_be_unique_and_present() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.aggregates.clear();
    assert_invalid(config.validate(), "aggregates must not be empty")?;

    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.aggregates.push(AggregateConfig {
        name: "itemcountbycustomer".to_string(),
        query_param: "customer".to_string(),
        attribute: "customer".to_string(),
    });
    assert_invalid(config.validate(), "duplicated")
}

#[test]
fn aggregate_attribute_must_parse() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.aggregates[1].attribute = "product-code".to_string();
    assert_invalid(config.validate(), "attribute")
}

#[test]
fn loader_limits_enforced() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.loader.max_concurrency = 0;
    assert_invalid(config.validate(), "loader.max_concurrency")?;
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.loader.documents_per_batch = 1_000_000;
    assert_invalid(config.validate(), "loader.documents_per_batch")
}

#[test]
fn unknown_fields_are_rejected() -> TestResult {
    match common::config_from_toml("[store]\ndatabse = \"TestDB\"\n") {
        Ok(_) => Err("unknown store field should fail to parse".to_string()),
        Err(_) => Ok(()),
    }
}
