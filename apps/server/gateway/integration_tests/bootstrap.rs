// Integration tests for wiring gateway-core collaborators from config

use gateway::bootstrap::build_deps;
use gateway::error::GatewayError;

use gateway_core::Registry;
use gateway_core::config::{GatewayConfig, PusherConfig};

use common::RedactedSecret;

/// Closed local port; connects fail fast.
const UNREACHABLE_BRIDGE: &str = "ws://127.0.0.1:9/bridge";

fn config_with_bridge(data_dir: &std::path::Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.data_dir = data_dir.to_path_buf();
    config.bridge.url = Some(UNREACHABLE_BRIDGE.to_string());
    config
}

/// **VALUE**: Verifies startup fails clearly when no bridge url is configured.
///
/// **WHY THIS MATTERS**: Without a bridge no instance can ever connect. Failing at
/// startup beats a registry full of instances stuck reconnecting.
///
/// **BUG THIS CATCHES**: Would catch a default bridge url being invented silently.
#[test]
fn given_no_bridge_url_when_building_deps_then_returns_core_error() {
    // GIVEN: Default config (no bridge url)
    let config = GatewayConfig::default();

    // WHEN: Building the collaborators
    let result = build_deps(config);

    // THEN: A core error naming the missing setting
    match result {
        Err(GatewayError::Core { message, .. }) => {
            assert!(message.contains("GATEWAY_BRIDGE_URL"), "{message}")
        }
        Err(other) => panic!("Expected Core error, got {other:?}"),
        Ok(_) => panic!("Expected an error without a bridge url"),
    }
}

#[test]
fn given_malformed_bridge_url_when_building_deps_then_returns_error() {
    let mut config = GatewayConfig::default();
    config.bridge.url = Some("not a url".to_string());

    assert!(build_deps(config).is_err());
}

/// **VALUE**: Verifies the push channel is only wired when credentials exist.
///
/// **BUG THIS CATCHES**: Would catch broadcasts being attempted with an empty app
/// id, which the push service rejects on every connection update.
#[test]
fn given_bridge_without_pusher_when_building_deps_then_no_broadcaster() {
    let data_dir = tempfile::tempdir().unwrap();

    let deps = build_deps(config_with_bridge(data_dir.path())).unwrap();

    assert!(deps.broadcaster.is_none());
    assert_eq!(deps.config.data_dir, data_dir.path());
}

#[test]
fn given_pusher_credentials_when_building_deps_then_broadcaster_is_wired() {
    // GIVEN: Config with bridge and push credentials
    let data_dir = tempfile::tempdir().unwrap();
    let mut config = config_with_bridge(data_dir.path());
    config.pusher = Some(PusherConfig {
        app_id: "3".to_string(),
        key: "278d425bdf160c739803".to_string(),
        secret: RedactedSecret::new("7ad3773142a6692b25b8"),
        cluster: "eu".to_string(),
    });

    // WHEN: Building the collaborators
    let deps = build_deps(config).unwrap();

    // THEN: A broadcaster is present
    assert!(deps.broadcaster.is_some());
}

/// **VALUE**: Verifies a registry built from real deps restores persisted sessions.
///
/// **WHY THIS MATTERS**: This is the startup path of the binary minus the signal
/// wait. Restored instances must exist even while the bridge is unreachable.
///
/// **BUG THIS CATCHES**: Would catch restore depending on a successful connect.
#[tokio::test]
async fn given_persisted_session_when_restoring_with_real_deps_then_instance_registered() {
    // GIVEN: A data dir with one session directory
    let data_dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(data_dir.path().join("alpha")).unwrap();
    let registry = Registry::new(build_deps(config_with_bridge(data_dir.path())).unwrap());

    // WHEN: Restoring
    let restored = registry.restore().await.unwrap();

    // THEN: The instance is registered under its directory name
    assert_eq!(restored, 1);
    assert!(registry.get("alpha").await.is_ok());

    // Cleanup
    registry.shutdown().await;
}
