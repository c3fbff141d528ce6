//! Unit tests for configuration module

use pix_poller::config::{PollerConfig, PollingConfig, ServiceConfig};
use pix_poller::PollerSettings;
use rust_decimal::Decimal;
use std::time::Duration;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Create a minimal valid PollerConfig for testing
fn create_test_config() -> PollerConfig {
    PollerConfig {
        service: ServiceConfig {
            backend_url: "http://127.0.0.1:8000/api".to_string(),
            auth_token_env: None,
            request_timeout_ms: 15_000,
        },
        polling: PollingConfig::default(),
    }
}

// ============================================================================
// PARSING TESTS
// ============================================================================

/// What is tested: a config with only the service section gets polling defaults
/// Why: The reference cadence (10s polls, 1s clock, 0.01 minimum) should not need configuring
#[test]
fn test_parse_minimal_config() {
    let config: PollerConfig = toml::from_str(
        r#"
        [service]
        backend_url = "https://wallet.example.com/api"
        "#,
    )
    .unwrap();

    assert_eq!(config.service.request_timeout_ms, 15_000);
    assert!(config.service.auth_token_env.is_none());
    assert_eq!(config.polling.interval_ms, 10_000);
    assert_eq!(config.polling.clock_tick_ms, 1_000);
    assert_eq!(config.polling.min_amount, Decimal::new(1, 2));
    assert_eq!(config.polling.default_expiry_secs, 1_800);
    assert!(config.validate().is_ok());
}

/// What is tested: the shipped template parses and validates
/// Why: Users start from the template
#[test]
fn test_template_is_valid() {
    let content = include_str!("../config/pix-poller.template.toml");
    let config: PollerConfig = toml::from_str(content).unwrap();

    assert!(config.validate().is_ok());
    assert_eq!(
        config.service.auth_token_env.as_deref(),
        Some("PIX_POLLER_AUTH_TOKEN")
    );
}

/// What is tested: PollerSettings::from_config() converts units
/// Why: Milliseconds and seconds in TOML become Durations
#[test]
fn test_settings_from_config() {
    let polling = PollingConfig {
        interval_ms: 5_000,
        clock_tick_ms: 250,
        min_amount: Decimal::new(150, 2),
        default_expiry_secs: 600,
    };

    let settings = PollerSettings::from_config(&polling);

    assert_eq!(settings.poll_interval, Duration::from_secs(5));
    assert_eq!(settings.clock_tick, Duration::from_millis(250));
    assert_eq!(settings.min_amount, Decimal::new(150, 2));
    assert_eq!(settings.default_expiry, Duration::from_secs(600));
}

// ============================================================================
// VALIDATION TESTS
// ============================================================================

/// What is tested: validate() accepts a valid configuration
/// Why: Ensure valid configs pass validation
#[test]
fn test_config_validation_success() {
    assert!(create_test_config().validate().is_ok());
}

/// What is tested: validate() rejects non-http backend URLs
/// Why: The client only speaks HTTP(S)
#[test]
fn test_config_rejects_bad_url() {
    let mut config = create_test_config();
    config.service.backend_url = "127.0.0.1:8000".to_string();

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("backend_url"));
}

/// What is tested: validate() rejects zero intervals
/// Why: A zero interval would spin the watch loop
#[test]
fn test_config_rejects_zero_intervals() {
    let mut config = create_test_config();
    config.polling.interval_ms = 0;
    assert!(config.validate().unwrap_err().to_string().contains("interval_ms"));

    let mut config = create_test_config();
    config.polling.clock_tick_ms = 0;
    assert!(config.validate().unwrap_err().to_string().contains("clock_tick_ms"));

    let mut config = create_test_config();
    config.service.request_timeout_ms = 0;
    assert!(config.validate().unwrap_err().to_string().contains("request_timeout_ms"));
}

/// What is tested: validate() rejects non-positive minimum amounts
/// Why: The minimum guards every deposit request
#[test]
fn test_config_rejects_bad_min_amount() {
    for bad in [Decimal::ZERO, Decimal::new(-1, 0)] {
        let mut config = create_test_config();
        config.polling.min_amount = bad;
        assert!(config.validate().is_err(), "min_amount {} should be rejected", bad);
    }
}

/// What is tested: min_amount is parsed as a decimal string when the file is read
/// Why: An unparsable amount must fail at load time, not at the first deposit
#[test]
fn test_parse_min_amount() {
    let config: PollerConfig = toml::from_str(
        r#"
        [service]
        backend_url = "http://127.0.0.1:8000"

        [polling]
        min_amount = "2.50"
        "#,
    )
    .unwrap();
    assert_eq!(config.polling.min_amount, Decimal::new(250, 2));

    let result = toml::from_str::<PollerConfig>(
        r#"
        [service]
        backend_url = "http://127.0.0.1:8000"

        [polling]
        min_amount = "ten"
        "#,
    );
    assert!(result.is_err());
}

// ============================================================================
// LOADING TESTS
// ============================================================================

/// What is tested: load_from_path() reports a missing file with copy instructions
/// Why: First-time users need to know about the template
#[test]
fn test_load_missing_file() {
    let err = PollerConfig::load_from_path(Some("/nonexistent/pix-poller.toml")).unwrap_err();
    assert!(err.to_string().contains("pix-poller.template.toml"));
}

/// What is tested: load_from_path() reads and validates a file
/// Why: Ensure the file-based path works end to end
#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("pix-poller-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        r#"
        [service]
        backend_url = "http://127.0.0.1:9000"

        [polling]
        interval_ms = 2000
        "#,
    )
    .unwrap();

    let config = PollerConfig::load_from_path(path.to_str()).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.service.backend_url, "http://127.0.0.1:9000");
    assert_eq!(config.polling.interval_ms, 2000);
    assert_eq!(config.polling.clock_tick_ms, 1000);
}

/// What is tested: load_from_path() refuses an invalid file
/// Why: Validation runs on load, not only on demand
#[test]
fn test_load_invalid_file() {
    let path = std::env::temp_dir().join(format!("pix-poller-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        r#"
        [service]
        backend_url = "ftp://wallet"
        "#,
    )
    .unwrap();

    let result = PollerConfig::load_from_path(path.to_str());
    std::fs::remove_file(&path).unwrap();

    assert!(result.is_err());
}

/// What is tested: auth_token() reads the configured environment variable
/// Why: Tokens are kept out of config files
#[test]
fn test_auth_token_from_env() {
    let mut config = create_test_config();
    config.service.auth_token_env = Some("PIX_POLLER_TEST_TOKEN_VAR".to_string());
    assert!(config.auth_token().is_none());

    std::env::set_var("PIX_POLLER_TEST_TOKEN_VAR", "abc123");
    assert_eq!(config.auth_token().as_deref(), Some("abc123"));
    std::env::remove_var("PIX_POLLER_TEST_TOKEN_VAR");
}
