// Unit tests for per-instance webhook config persistence

use crate::config::webhook::{WebhookConfig, WebhookConfigUpdate};

use tempfile::TempDir;

/// **VALUE**: Verifies a saved config reads back unchanged from disk.
///
/// **WHY THIS MATTERS**: Webhook targets must survive restarts; the restore path
/// reloads them on every connect.
///
/// **BUG THIS CATCHES**: Would catch the temp-file rename landing at the wrong path,
/// or `sendMessage` losing its camelCase name on disk.
#[test]
fn given_saved_config_when_loaded_then_matches() {
    // GIVEN: A config saved into a not-yet-existing directory
    let dir = TempDir::new().expect("temp dir");
    let webhook_dir = dir.path().join("webhooks");
    let config = WebhookConfig {
        url: "https://example.com/hook".to_string(),
        send_message: true,
    };
    config.save(&webhook_dir, "abc").expect("save should succeed");

    // WHEN: Loading it back
    let loaded = WebhookConfig::load(&webhook_dir, "abc").expect("load should succeed");

    // THEN: Same values, persisted with the wire field name
    assert_eq!(loaded, config);
    let raw = std::fs::read_to_string(WebhookConfig::path(&webhook_dir, "abc")).expect("read");
    assert!(raw.contains("\"sendMessage\":true"));
    assert!(!webhook_dir.join("abc.json.tmp").exists());
}

#[test]
fn given_missing_file_when_loaded_then_returns_default() {
    let dir = TempDir::new().expect("temp dir");

    let loaded = WebhookConfig::load(dir.path(), "nobody").expect("load should succeed");

    assert_eq!(loaded, WebhookConfig::default());
    assert!(!loaded.is_active());
}

/// **VALUE**: Verifies a corrupted file is an error for `load` and defaults for
/// `load_or_default`.
#[test]
fn given_corrupt_file_when_loaded_then_load_errors_and_fallback_defaults() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(WebhookConfig::path(dir.path(), "bad"), "{not json").expect("write");

    assert!(WebhookConfig::load(dir.path(), "bad").is_err());
    assert_eq!(
        WebhookConfig::load_or_default(dir.path(), "bad"),
        WebhookConfig::default()
    );
}

/// **VALUE**: Verifies partial updates only touch the fields they carry.
///
/// **BUG THIS CATCHES**: Would catch an update that toggles `sendMessage` wiping the
/// stored url, or an empty url clearing a configured target.
#[test]
fn given_partial_update_when_applied_then_keeps_other_fields() {
    // GIVEN: An active config
    let mut config = WebhookConfig {
        url: "https://example.com/hook".to_string(),
        send_message: true,
    };

    // WHEN: Only the flag changes, then an empty url arrives
    config.apply(WebhookConfigUpdate {
        url: None,
        send_message: Some(false),
    });
    config.apply(WebhookConfigUpdate {
        url: Some(String::new()),
        send_message: None,
    });

    // THEN: Url kept, flag updated
    assert_eq!(config.url, "https://example.com/hook");
    assert!(!config.send_message);
    assert!(!config.is_active());
}

#[test]
fn given_url_without_flag_when_is_active_then_false() {
    let config = WebhookConfig {
        url: "https://example.com/hook".to_string(),
        send_message: false,
    };
    assert!(!config.is_active());
}
