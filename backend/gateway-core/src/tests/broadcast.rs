// Unit tests for push-broadcast request signing

use crate::config::PusherConfig;
use crate::error::notify::NotifyError;
use crate::notify::{Broadcaster, PusherBroadcaster};
use crate::notify::broadcast::{auth_query, sign_request};

use common::RedactedSecret;

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOC_BODY: &str = r#"{"name":"foo","channels":["project-3"],"data":"{\"some\":\"data\"}"}"#;

/// **VALUE**: Verifies the auth query matches the published reference request.
///
/// **BUG THIS CATCHES**: Would catch unsorted parameters or a body hash over the
/// wrong bytes. The server rejects either with 401.
#[test]
fn given_reference_body_when_auth_query_then_matches_reference() {
    let query = auth_query("278d425bdf160c739803", 1353088179, DOC_BODY);

    assert_eq!(
        query,
        "auth_key=278d425bdf160c739803&auth_timestamp=1353088179&auth_version=1.0&body_md5=ec365a775a4cd0599faeb73354201b6f"
    );
}

/// **VALUE**: Verifies the HMAC signature matches the published reference request.
#[test]
fn given_reference_request_when_signed_then_matches_reference_signature() {
    let query = auth_query("278d425bdf160c739803", 1353088179, DOC_BODY);

    let signature =
        sign_request("7ad3773142a6692b25b8", "/apps/3/events", &query).expect("should sign");

    assert_eq!(
        signature,
        "da454824c97ba181a32ccc17a72625ba02771f50b50e1e7430e47a1f3f457e6c"
    );
}

fn pusher_config() -> PusherConfig {
    PusherConfig {
        app_id: "42".to_string(),
        key: "app-key".to_string(),
        secret: RedactedSecret::new("app-secret"),
        cluster: "mt1".to_string(),
    }
}

/// **VALUE**: Verifies a broadcast posts a signed request to the events endpoint.
#[tokio::test]
async fn given_mock_server_when_broadcast_then_posts_signed_event() {
    // GIVEN: A server accepting signed event posts
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apps/42/events"))
        .and(query_param("auth_key", "app-key"))
        .and(query_param("auth_version", "1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).expect("mock uri");
    let broadcaster =
        PusherBroadcaster::with_base_url(&pusher_config(), base, reqwest::Client::new());

    // WHEN: Broadcasting
    let result = broadcaster
        .broadcast("abc", "connection.update", &json!({ "connectionState": "open" }))
        .await;

    // THEN: Accepted
    assert!(result.is_ok(), "broadcast failed: {result:?}");
}

#[tokio::test]
async fn given_server_error_when_broadcast_then_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).expect("mock uri");
    let broadcaster =
        PusherBroadcaster::with_base_url(&pusher_config(), base, reqwest::Client::new());

    let result = broadcaster.broadcast("abc", "qrcode.update", &json!({})).await;

    match result {
        Err(e @ NotifyError::Rejected { .. }) => assert_eq!(e.category(), "server_error"),
        other => panic!("Expected Rejected, got {other:?}"),
    }
}

#[test]
fn given_cluster_when_new_then_targets_cluster_host() {
    let broadcaster = PusherBroadcaster::new(&pusher_config(), reqwest::Client::new());
    assert!(broadcaster.is_ok());
}
