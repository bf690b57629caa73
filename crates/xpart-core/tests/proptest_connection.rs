// crates/xpart-core/tests/proptest_connection.rs
// ============================================================================
// Module: Connection String Property-Based Tests
// Description: Property tests for parse/probe agreement and round trips.
// Purpose: Detect divergence between the two parse entry points.
// ============================================================================

//! Property-based tests for connection string invariants.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use url::Url;
use xpart_core::ConnectionDescriptor;

fn endpoint_strategy() -> impl Strategy<Value = String> {
    let port = prop_oneof![Just(443_u16), 1_u16 .. u16::MAX];
    ("[A-Za-z][A-Za-z0-9]{0,11}", prop::option::of(port), any::<bool>()).prop_map(
        |(host, port, trailing_slash)| {
            let slash = if trailing_slash { "/" } else { "" };
            match port {
                Some(port) => format!("https://{host}.Example:{port}{slash}"),
                None => format!("https://{host}.example{slash}"),
            }
        },
    )
}

fn key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9+/]{1,40}={0,2}"
}

fn extra_settings_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("Extra[A-Z][a-z]{0,6}", "[A-Za-z0-9]{0,8}"), 0 .. 3).prop_map(
        |mut settings| {
            settings.sort_by(|a, b| a.0.to_ascii_lowercase().cmp(&b.0.to_ascii_lowercase()));
            settings.dedup_by(|a, b| a.0.eq_ignore_ascii_case(&b.0));
            settings
        },
    )
}

fn render(endpoint: &str, key: &str, extras: &[(String, String)], key_first: bool) -> String {
    let mut segments = vec![format!("AccountEndpoint={endpoint}"), format!("AccountKey={key}")];
    if key_first {
        segments.reverse();
    }
    segments.extend(extras.iter().map(|(name, value)| format!("{name}={value}")));
    segments.join(";")
}

proptest! {
    #[test]
    fn well_formed_strings_round_trip(
        endpoint in endpoint_strategy(),
        key in key_strategy(),
        extras in extra_settings_strategy(),
        key_first in any::<bool>(),
    ) {
        let raw = render(&endpoint, &key, &extras, key_first);
        let parsed = ConnectionDescriptor::parse(&raw).unwrap();
        let expected = Url::parse(&endpoint).unwrap();
        prop_assert_eq!(parsed.endpoint(), &expected);
        let reparsed =
            ConnectionDescriptor::parse(&render(expected.as_str(), &key, &extras, key_first)).unwrap();
        prop_assert_eq!(reparsed.endpoint().as_str(), expected.as_str());
        prop_assert_eq!(parsed.auth_key(), key.as_str());
        prop_assert_eq!(ConnectionDescriptor::try_parse(&raw), Some(parsed.clone()));
        prop_assert_eq!(ConnectionDescriptor::parse(&raw).unwrap(), parsed);
    }

    #[test]
    fn missing_or_duplicate_keys_fail_both_ways(
        endpoint in endpoint_strategy(),
        key in key_strategy(),
        mutation in 0_u8 .. 4,
    ) {
        let raw = match mutation {
            0 => format!("AccountEndpoint={endpoint}"),
            1 => format!("AccountKey={key}"),
            2 => format!("AccountEndpoint={endpoint};AccountKey={key};ACCOUNTKEY={key}"),
            _ => format!("AccountEndpoint={endpoint};AccountKey{key}"),
        };
        prop_assert!(ConnectionDescriptor::parse(&raw).is_err());
        prop_assert!(ConnectionDescriptor::try_parse(&raw).is_none());
    }

    #[test]
    fn arbitrary_input_never_diverges(raw in ".{0,64}") {
        let parsed = ConnectionDescriptor::parse(&raw).ok();
        prop_assert_eq!(ConnectionDescriptor::try_parse(&raw), parsed);
    }
}
