//! Configuration Module Tests
//!
//! Unit tests and property-based tests for the config module.
//!
//! Property tests validate:
//! - Present properties are parsed, missing ones keep their defaults
//! - Channel lists survive whitespace around separators

use deribit_ws_client::{Config, TEST_BASE_URL};
use proptest::prelude::*;
use std::time::Duration;

#[test]
fn test_default_config_values() {
    let config = Config::default();

    assert_eq!(config.addr, TEST_BASE_URL);
    assert!(config.api_key.is_empty());
    assert!(config.secret_key.is_empty());
    assert!(!config.auto_reconnect);
    assert!(!config.debug_mode);
    assert_eq!(config.connect_attempts, 10);
    assert_eq!(config.retry_delay, Duration::from_secs(1));
    assert_eq!(config.dial_timeout, Duration::from_secs(10));
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert!(config.channels.is_empty());
    assert_eq!(config.heartbeat_interval, None);
}

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("deribit_client_{}.properties", std::process::id()));
    std::fs::write(&path, "ADDR=ws://localhost:8080\nAUTO_RECONNECT=true\n").unwrap();

    let config = Config::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.addr, "ws://localhost:8080");
    assert!(config.auto_reconnect);
}

#[test]
fn test_load_missing_file_fails() {
    assert!(Config::load("/nonexistent/client.properties").is_err());
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn channel_strategy() -> impl Strategy<Value = String> {
    "(user\\.)?[a-z]{3,8}\\.[A-Z]{3}-PERPETUAL\\.raw"
}

proptest! {
    #[test]
    fn prop_config_defaults_preserved(
        attempts in 1u32..100u32,
        delay_ms in 0u64..10_000u64
    ) {
        let content = format!("CONNECT_ATTEMPTS={}\nRETRY_DELAY_MS={}\n", attempts, delay_ms);

        let config = Config::from_properties_str(&content).unwrap();

        prop_assert_eq!(config.connect_attempts, attempts);
        prop_assert_eq!(config.retry_delay, Duration::from_millis(delay_ms));

        // Missing fields have default values
        prop_assert_eq!(config.addr.as_str(), TEST_BASE_URL);
        prop_assert_eq!(config.dial_timeout, Duration::from_secs(10));
        prop_assert!(!config.auto_reconnect);
    }

    #[test]
    fn prop_channel_list_parsed(channels in prop::collection::vec(channel_strategy(), 1..6)) {
        let content = format!("CHANNELS={}\n", channels.join(" , "));

        let config = Config::from_properties_str(&content).unwrap();

        prop_assert_eq!(config.channels, channels);
    }
}
