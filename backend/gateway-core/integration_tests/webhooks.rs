use crate::helpers::{HarnessBuilder, eventually, record};

use gateway_core::config::webhook::{WebhookConfig, WebhookConfigUpdate};
use gateway_core::protocol::{MessageUpsertKind, ProtocolEvent};

use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn hook_server(route: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(route.to_string()))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect()
}

async fn wait_for_message_type(server: &MockServer, message_type: &str) -> Value {
    for _ in 0..300 {
        if let Some(body) = bodies(server)
            .await
            .into_iter()
            .find(|b| b["messageType"] == message_type)
        {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no {message_type} webhook received");
}

/// **VALUE**: Verifies connection and message webhooks reach the primary endpoint.
///
/// **WHY THIS MATTERS**: The primary webhook is how the integrating system learns that
/// a session is usable and that customers wrote in.
#[tokio::test]
async fn given_primary_webhook_when_open_and_message_then_both_posted() {
    // GIVEN: A primary endpoint
    let server = hook_server("/primary").await;
    let url = format!("{}/primary", server.uri());
    let mut harness = HarnessBuilder::new()
        .configure(|c| c.webhook.base_url = Some(url))
        .build();

    // WHEN: The session opens and a message arrives
    let (_instance, handle) = harness.logged_in("abc").await;
    handle
        .emit(ProtocolEvent::MessagesUpsert {
            kind: MessageUpsertKind::Notify,
            messages: vec![record(json!({
                "key": { "id": "m1", "remoteJid": "1@s.whatsapp.net", "fromMe": false },
                "message": { "conversation": "hello" },
            }))],
        })
        .await;

    // THEN: Both payloads were posted
    let connection = wait_for_message_type(&server, "connection_update").await;
    assert_eq!(connection["instance_key"], "abc");
    assert_eq!(connection["connection_state"], "open");

    let message = wait_for_message_type(&server, "conversation").await;
    assert_eq!(message["remoteJid"], "1@s.whatsapp.net");
    assert_eq!(message["jid"], "5500000000001:7@s.whatsapp.net");
}

/// **VALUE**: Verifies the per-instance opt-out silences the primary endpoint.
#[tokio::test]
async fn given_instance_with_webhook_disabled_when_open_then_primary_not_posted() {
    let server = hook_server("/primary").await;
    let url = format!("{}/primary", server.uri());
    let mut harness = HarnessBuilder::new()
        .configure(|c| c.webhook.base_url = Some(url))
        .build();

    let instance = harness.registry.create(Some("quiet".to_string()), true).await;
    let handle = harness.next_session().await;
    handle.open().await;
    let watched = instance.clone();
    eventually(move || {
        let watched = watched.clone();
        async move { watched.user().await.is_some() }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(bodies(&server).await.is_empty());
}

/// **VALUE**: Verifies a webhook config update is persisted and activates the
/// secondary endpoint.
///
/// **BUG THIS CATCHES**: Would catch an update that only changes memory (lost on the
/// next reconnect reload) or a secondary endpoint that stays silent after enabling.
#[tokio::test]
async fn given_webhook_update_when_applied_then_persisted_and_secondary_receives() {
    // GIVEN: A secondary endpoint and a logged-in instance
    let server = hook_server("/secondary").await;
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;

    // WHEN: Enabling the secondary webhook
    let updated = instance
        .update_webhook(WebhookConfigUpdate {
            url: Some(format!("{}/secondary", server.uri())),
            send_message: Some(true),
        })
        .await;

    // THEN: Persisted on disk
    assert!(updated.is_active());
    let webhook_dir = harness.data_dir.path().join("webhooks");
    let stored = WebhookConfig::load(&webhook_dir, "abc").expect("stored config");
    assert_eq!(stored, updated);
    assert_eq!(instance.webhook_config().await, updated);

    // AND: New webhooks go to the secondary endpoint
    handle
        .emit(ProtocolEvent::Call(vec![record(
            json!({ "id": "call1", "from": "1@s.whatsapp.net", "status": "offer" }),
        )]))
        .await;
    let mut call = None;
    for _ in 0..300 {
        call = bodies(&server)
            .await
            .into_iter()
            .find(|b| b["type"] == "call");
        if call.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let call = call.expect("call webhook posted to secondary");
    assert_eq!(call["remoteJidFone"], "1@s.whatsapp.net");
    assert_eq!(call["instance_key"], "abc");
}

/// **VALUE**: Verifies a failing secondary endpoint does not stop delivery to the
/// primary one.
///
/// **WHY THIS MATTERS**: The two endpoints belong to different systems. One of them
/// being down must not silence the other.
///
/// **BUG THIS CATCHES**: Would catch the primary post being skipped or aborted when the
/// secondary answers with an error.
#[tokio::test]
async fn given_secondary_returning_500_when_event_then_primary_still_receives() {
    // GIVEN: A healthy primary and a secondary that always fails
    let primary = hook_server("/primary").await;
    let secondary = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/secondary"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&secondary)
        .await;
    let url = format!("{}/primary", primary.uri());
    let mut harness = HarnessBuilder::new()
        .configure(|c| c.webhook.base_url = Some(url))
        .build();
    let (instance, handle) = harness.logged_in("abc").await;
    instance
        .update_webhook(WebhookConfigUpdate {
            url: Some(format!("{}/secondary", secondary.uri())),
            send_message: Some(true),
        })
        .await;

    // WHEN: A call event is relayed
    handle
        .emit(ProtocolEvent::Call(vec![record(
            json!({ "id": "call1", "from": "1@s.whatsapp.net", "status": "offer" }),
        )]))
        .await;

    // THEN: The primary got it and the secondary was attempted
    let mut delivered = false;
    for _ in 0..300 {
        delivered = bodies(&primary).await.iter().any(|b| b["type"] == "call");
        if delivered {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered, "primary should receive the call webhook");
    eventually(|| async { bodies(&secondary).await.iter().any(|b| b["type"] == "call") })
        .await;
}

/// **VALUE**: Verifies a secondary URL without the send flag receives nothing.
///
/// **BUG THIS CATCHES**: Would catch the dispatcher posting to any stored URL instead of
/// only to an active secondary webhook.
#[tokio::test]
async fn given_secondary_url_with_flag_off_when_event_then_not_posted() {
    // GIVEN: A primary endpoint and a stored secondary URL that is switched off
    let primary = hook_server("/primary").await;
    let secondary = hook_server("/secondary").await;
    let url = format!("{}/primary", primary.uri());
    let mut harness = HarnessBuilder::new()
        .configure(|c| c.webhook.base_url = Some(url))
        .build();
    let (instance, handle) = harness.logged_in("abc").await;
    let updated = instance
        .update_webhook(WebhookConfigUpdate {
            url: Some(format!("{}/secondary", secondary.uri())),
            send_message: Some(false),
        })
        .await;
    assert!(!updated.is_active());

    // WHEN: A call event is relayed
    handle
        .emit(ProtocolEvent::Call(vec![record(
            json!({ "id": "call1", "from": "1@s.whatsapp.net", "status": "offer" }),
        )]))
        .await;

    // THEN: Only the primary sees it
    eventually(|| async { bodies(&primary).await.iter().any(|b| b["type"] == "call") }).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bodies(&secondary).await.is_empty());
}
