// Unit tests for layered gateway configuration

use crate::config::GatewayConfig;
use crate::config::env::{EnvSource, process_env};
use crate::error::config::ConfigError;

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use serial_test::serial;
use tempfile::NamedTempFile;

fn env_of(pairs: &[(&str, &str)]) -> EnvSource<impl Fn(&str) -> Option<String>> {
    let table: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EnvSource::new(move |key: &str| table.get(key).cloned())
}

/// **VALUE**: Verifies the defaults match the documented operational constants.
///
/// **WHY THIS MATTERS**: QR budget and group pacing defaults are user-visible behavior.
/// Silent drift changes how many QR codes a user sees and how fast group updates run.
#[test]
fn given_no_overrides_when_default_then_uses_documented_limits() {
    // GIVEN / WHEN: Default config
    let config = GatewayConfig::default();

    // THEN: Documented defaults
    assert_eq!(config.data_dir, PathBuf::from("./instances_data"));
    assert_eq!(config.limits.qr_limit, 5);
    assert_eq!(config.limits.group_update_delay_ms, 1500);
    assert_eq!(config.limits.retry_cache_capacity, 1024);
    assert!(config.webhook.ssl_verify);
    assert!(config.pusher().is_none());
    assert!(config.validate().is_ok());
}

/// **VALUE**: Verifies environment variables override every layer beneath them.
///
/// **BUG THIS CATCHES**: Would catch a renamed variable key (including the
/// historical `WEBOOK_` spelling deployments rely on).
#[test]
fn given_env_values_when_apply_env_then_overrides_fields() {
    // GIVEN: A table of environment values
    let env = env_of(&[
        ("GATEWAY_DATA_DIR", "/var/lib/gateway"),
        ("WEBOOK_BASE_URL", "https://hooks.example.com/in"),
        ("WEBOOK_SSL_VERIFY", "false"),
        ("DISABLE_WEBHOOK", "true"),
        ("BROWSER_CLIENT", "Acme"),
        ("GATEWAY_QR_LIMIT", "3"),
        ("GATEWAY_GROUP_UPDATE_DELAY_MS", "10"),
    ]);
    let mut config = GatewayConfig::default();

    // WHEN: Applying it
    config.apply_env(&env).expect("env should apply");

    // THEN: Each value lands in its field
    assert_eq!(config.data_dir, PathBuf::from("/var/lib/gateway"));
    assert_eq!(
        config.webhook.base_url.as_deref(),
        Some("https://hooks.example.com/in")
    );
    assert!(!config.webhook.ssl_verify);
    assert!(config.webhook.disabled);
    assert_eq!(config.browser.client, "Acme");
    assert_eq!(config.browser.triple()[2], crate::BROWSER_VERSION);
    assert_eq!(config.limits.qr_limit, 3);
    assert_eq!(config.limits.group_update_delay().as_millis(), 10);
}

/// **VALUE**: Verifies only the literal `true` enables a flag.
///
/// **BUG THIS CATCHES**: Would catch `DISABLE_WEBHOOK=1` or `yes` accidentally
/// silencing the primary webhook.
#[test]
fn given_non_true_flag_when_apply_env_then_flag_is_false() {
    let env = env_of(&[("DISABLE_WEBHOOK", "yes")]);
    let mut config = GatewayConfig::default();

    config.apply_env(&env).expect("env should apply");

    assert!(!config.webhook.disabled);
}

/// **VALUE**: Verifies a malformed numeric variable is reported with its key.
///
/// **WHY THIS MATTERS**: Falling back to the default would hide a typo in deployment
/// config until QR limits or pacing behave unexpectedly.
#[test]
fn given_non_numeric_limit_when_apply_env_then_returns_env_error() {
    // GIVEN: A non-numeric QR limit
    let env = env_of(&[("GATEWAY_QR_LIMIT", "five")]);
    let mut config = GatewayConfig::default();

    // WHEN: Applying it
    let result = config.apply_env(&env);

    // THEN: EnvError naming the variable
    match result {
        Err(ConfigError::EnvError { key, .. }) => assert_eq!(key, "GATEWAY_QR_LIMIT"),
        other => panic!("Expected EnvError, got {other:?}"),
    }
}

/// **VALUE**: Verifies push broadcast is enabled only by an app id, and then requires
/// the rest of its credentials.
///
/// **BUG THIS CATCHES**: Would catch a half-configured broadcaster signing requests
/// with an empty secret.
#[test]
fn given_pusher_app_id_without_secret_when_validate_then_fails() {
    // GIVEN: Only app id and key
    let env = env_of(&[("PUSHER_APP_ID", "42"), ("PUSHER_KEY", "k")]);
    let mut config = GatewayConfig::default();
    config.apply_env(&env).expect("env should apply");

    // WHEN / THEN: Validation refuses it
    assert!(config.pusher().is_some());
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError { .. })
    ));
}

#[test]
fn given_pusher_keys_without_app_id_when_apply_env_then_broadcast_stays_off() {
    let env = env_of(&[("PUSHER_KEY", "k"), ("PUSHER_SECRET", "s")]);
    let mut config = GatewayConfig::default();

    config.apply_env(&env).expect("env should apply");

    assert!(config.pusher().is_none());
}

#[test]
fn given_invalid_urls_when_validate_then_fails() {
    let mut config = GatewayConfig::default();
    config.webhook.base_url = Some("ftp://hooks.example.com".to_string());
    assert!(config.validate().is_err());

    let mut config = GatewayConfig::default();
    config.bridge.url = Some("http://127.0.0.1:7000".to_string());
    assert!(config.validate().is_err());

    let mut config = GatewayConfig::default();
    config.bridge.url = Some("ws://127.0.0.1:7000".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn given_zero_qr_limit_when_validate_then_fails() {
    let mut config = GatewayConfig::default();
    config.limits.qr_limit = 0;
    assert!(config.validate().is_err());
}

/// **VALUE**: Verifies a partial TOML file keeps defaults for missing sections.
///
/// **BUG THIS CATCHES**: Would catch a missing `#[serde(default)]` that makes every
/// section mandatory.
#[test]
fn given_partial_toml_when_from_file_then_merges_with_defaults() {
    // GIVEN: A config file with one section
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "data_dir = \"/srv/data\"\n\n[limits]\nqr_limit = 2\n\n[bridge]\nurl = \"ws://localhost:9000\""
    )
    .expect("write config");

    // WHEN: Loading it
    let config = GatewayConfig::from_file(file.path()).expect("config should parse");

    // THEN: File values win, everything else defaults
    assert_eq!(config.data_dir, PathBuf::from("/srv/data"));
    assert_eq!(config.limits.qr_limit, 2);
    assert_eq!(config.limits.group_update_delay_ms, 1500);
    assert_eq!(config.bridge.url.as_deref(), Some("ws://localhost:9000"));
    assert_eq!(config.bridge.call_timeout_secs, 60);
}

#[test]
fn given_malformed_toml_when_from_file_then_returns_parse_error() {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "data_dir = [").expect("write config");

    let result = GatewayConfig::from_file(file.path());

    assert!(matches!(result, Err(ConfigError::ParseError { .. })));
}

#[test]
fn given_missing_file_when_from_file_then_returns_read_error() {
    let result = GatewayConfig::from_file(&PathBuf::from("/nonexistent/gateway.toml"));
    assert!(matches!(result, Err(ConfigError::ReadError { .. })));
}

/// **VALUE**: Verifies the process environment source reads real variables.
#[test]
#[serial]
fn given_process_env_var_when_apply_env_then_value_is_read() {
    // SAFETY: test-only env mutation, serialized with #[serial].
    unsafe { std::env::set_var("GATEWAY_RECONNECT_MAX_MS", "45000") };
    let mut config = GatewayConfig::default();
    let result = config.apply_env(&process_env());
    unsafe { std::env::remove_var("GATEWAY_RECONNECT_MAX_MS") };

    assert!(result.is_ok());
    assert_eq!(config.reconnect.max_ms, 45_000);
}

#[test]
fn given_data_dir_when_paths_derived_then_nest_under_it() {
    let mut config = GatewayConfig::default();
    config.data_dir = PathBuf::from("/data");

    assert_eq!(config.webhook_dir(), PathBuf::from("/data/webhooks"));
    assert_eq!(config.session_dir("abc"), PathBuf::from("/data/abc"));
}
