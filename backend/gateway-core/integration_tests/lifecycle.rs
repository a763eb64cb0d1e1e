use crate::helpers::{HarnessBuilder, connection, eventually, record};

use gateway_core::error::InstanceError;
use gateway_core::protocol::{ConnectionPhase, MessageUpsertKind, ProtocolEvent};
use gateway_core::{ConnectionStatus, QR_LIMIT_REASON};

use std::time::Duration;

use serde_json::json;

/// **VALUE**: Verifies an open connection records the account and refuses QR requests.
#[tokio::test]
async fn given_open_update_when_handled_then_status_open_and_user_set() {
    // GIVEN: A connected instance
    let mut harness = HarnessBuilder::new().build();

    // WHEN: The session opens
    let (instance, _handle) = harness.logged_in("abc").await;

    // THEN: Open, user known, QR refused
    assert_eq!(instance.status().await, ConnectionStatus::Open);
    assert!(instance.require_login().await.is_ok());
    assert!(matches!(
        instance.qr_code_base64().await,
        Err(InstanceError::PermissionDenied { .. })
    ));
    let summary = instance.summary().await;
    assert_eq!(summary.connection_state.as_str(), "open");
}

/// **VALUE**: Verifies the QR budget: five challenges are shown, the sixth ends the
/// session with the terminal reason.
///
/// **WHY THIS MATTERS**: Unbounded QR issuance keeps a session alive forever for a user
/// who walked away, and the protocol server eventually flags the device.
///
/// **BUG THIS CATCHES**: Would catch an off-by-one (four or six codes shown) or the
/// terminal state being overwritten by later connection updates.
#[tokio::test]
async fn given_qr_limit_when_sixth_qr_arrives_then_session_ends_terminally() {
    // GIVEN: A connected instance
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.connected("abc").await;

    // WHEN: Six QR challenges arrive, then a seventh
    for n in 1..=7 {
        handle.qr(&format!("challenge-{n}")).await;
    }

    // THEN: Five shown, terminal status, session ended with 500
    let watched = instance.clone();
    eventually(move || {
        let watched = watched.clone();
        async move { watched.status().await == ConnectionStatus::QrLimitReached }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(instance.qr_count().await, 5);
    assert_eq!(instance.qr_code().await.as_deref(), Some("qr:challenge-5"));
    assert_eq!(instance.status().await, ConnectionStatus::QrLimitReached);
    let ends = handle.session.calls_to("end");
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].arg, format!("500:{QR_LIMIT_REASON}"));
}

#[tokio::test]
async fn given_qr_update_when_handled_then_awaiting_qr_with_rendered_code() {
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.connected("abc").await;

    handle.qr("first").await;

    let watched = instance.clone();
    eventually(move || {
        let watched = watched.clone();
        async move { watched.qr_code().await.is_some() }
    })
    .await;
    assert_eq!(instance.status().await, ConnectionStatus::AwaitingQr);
    assert_eq!(
        instance.qr_code_base64().await.expect("not logged in yet"),
        Some("qr:first".to_string())
    );
}

/// **VALUE**: Verifies a logged-out close removes credentials and does not reconnect.
///
/// **BUG THIS CATCHES**: Would catch a reconnect loop against revoked credentials,
/// which the server answers with another 401 forever.
#[tokio::test]
async fn given_logged_out_close_when_handled_then_credentials_removed_no_reconnect() {
    // GIVEN: A logged-in instance
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;
    let session_dir = harness.data_dir.path().join("abc");

    // WHEN: The server reports logged out
    handle.close(401).await;

    // THEN: LoggedOut, credentials gone, no new session
    let watched = instance.clone();
    eventually(move || {
        let watched = watched.clone();
        async move { watched.status().await == ConnectionStatus::LoggedOut }
    })
    .await;
    assert!(!session_dir.exists());
    assert!(matches!(
        instance.require_login().await,
        Err(InstanceError::Unauthenticated { .. })
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(harness.opened.try_recv().is_err());
}

/// **VALUE**: Verifies logged out is terminal even when the transport reports its own
/// close afterwards.
///
/// **WHY THIS MATTERS**: After a 401 the sidecar drops the socket, which surfaces as a
/// 428 close. Reconnecting on it starts a QR login nobody asked for and burns the QR
/// budget.
///
/// **BUG THIS CATCHES**: Would catch a logged-out session that is not ended and keeps
/// feeding connection updates into the instance.
#[tokio::test]
async fn given_logged_out_when_transport_close_follows_then_stays_logged_out() {
    // GIVEN: An instance that was logged out by the server
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;
    handle.close(401).await;
    let watched = instance.clone();
    eventually(move || {
        let watched = watched.clone();
        async move { watched.status().await == ConnectionStatus::LoggedOut }
    })
    .await;

    // WHEN: The same session then reports a transient close
    let _ = handle
        .events
        .send(connection(Some(ConnectionPhase::Close), Some(428), None))
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // THEN: Still logged out, the session was ended and no new one opened
    assert_eq!(instance.status().await, ConnectionStatus::LoggedOut);
    assert!(
        handle
            .session
            .calls_to("end")
            .iter()
            .any(|c| c.arg.starts_with("401:"))
    );
    assert!(harness.opened.try_recv().is_err());
}

/// **VALUE**: Verifies a transient close reconnects and that the superseded session's
/// events are ignored.
///
/// **WHY THIS MATTERS**: The old socket can still flush buffered events after the new
/// one is up. Applying them would flip status back and forth.
#[tokio::test]
async fn given_transient_close_when_handled_then_reconnects_and_ignores_old_session() {
    // GIVEN: A logged-in instance
    let mut harness = HarnessBuilder::new().build();
    let (instance, old) = harness.logged_in("abc").await;

    // WHEN: The connection drops with 428
    old.close(428).await;

    // THEN: A second session is opened for the same key
    let fresh = harness.next_session().await;
    assert_eq!(fresh.instance_key, "abc");

    // AND: Events from the old session no longer apply
    let watched = instance.clone();
    eventually(move || {
        let watched = watched.clone();
        async move { watched.status().await == ConnectionStatus::Connecting }
    })
    .await;
    let _ = old
        .events
        .send(ProtocolEvent::ChatsSet(vec![record(json!({ "id": "stale" }))]))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(instance.chats().await.is_empty());

    // AND: The superseded session was ended, not left running
    let superseded = old.session.clone();
    eventually(move || {
        let superseded = superseded.clone();
        async move {
            superseded
                .calls_to("end")
                .iter()
                .any(|c| c.arg.ends_with(":reconnect"))
        }
    })
    .await;

    // AND: The new session drives the instance
    fresh.open().await;
    let watched = instance.clone();
    eventually(move || {
        let watched = watched.clone();
        async move { watched.status().await == ConnectionStatus::Open }
    })
    .await;
}

/// **VALUE**: Verifies inbound events populate the cache the read API serves.
#[tokio::test]
async fn given_chat_contact_and_message_events_when_handled_then_cache_serves_them() {
    // GIVEN: A logged-in instance
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;

    // WHEN: Sync events and a notify batch arrive
    handle
        .emit(ProtocolEvent::ChatsSet(vec![record(
            json!({ "id": "1@s.whatsapp.net", "name": "Ana" }),
        )]))
        .await;
    handle
        .emit(ProtocolEvent::ContactsUpsert(vec![record(
            json!({ "id": "77@lid", "jid": "1@s.whatsapp.net" }),
        )]))
        .await;
    handle
        .emit(ProtocolEvent::MessagesUpsert {
            kind: MessageUpsertKind::Notify,
            messages: vec![record(json!({
                "key": { "id": "m1", "remoteJid": "1@s.whatsapp.net", "fromMe": false },
                "message": { "conversation": "hi" },
            }))],
        })
        .await;
    handle.emit(ProtocolEvent::CredsUpdate).await;

    // THEN: Reads reflect them
    let watched = instance.clone();
    eventually(move || {
        let watched = watched.clone();
        async move { !watched.messages_for("1@s.whatsapp.net").await.is_empty() }
    })
    .await;
    assert_eq!(instance.chats().await.len(), 1);
    assert_eq!(instance.contacts().await.len(), 1);
    assert_eq!(instance.resolve_identity("77@lid").await, "1@s.whatsapp.net");

    let session = handle.session.clone();
    eventually(move || {
        let session = session.clone();
        async move { !session.calls_to("saveCreds").is_empty() }
    })
    .await;
}

#[tokio::test]
async fn given_logged_in_instance_when_logout_then_session_logged_out() {
    let mut harness = HarnessBuilder::new().build();
    let (_instance, handle) = harness.logged_in("abc").await;

    harness.registry.logout("abc").await.expect("logout should succeed");

    assert_eq!(handle.session.calls_to("logout").len(), 1);
    assert!(harness.registry.get("abc").await.is_ok());
}

/// **VALUE**: Verifies a credential save that never completes does not stall event
/// handling.
///
/// **WHY THIS MATTERS**: The save reply shares the transport with events. During a
/// history sync the event queue fills, and an event loop waiting on the reply would
/// wait out the call timeout while nothing else is applied.
///
/// **BUG THIS CATCHES**: Would catch `creds.update` awaiting the save inline.
#[tokio::test]
async fn given_stalled_credential_save_when_more_events_arrive_then_still_applied() {
    // GIVEN: A logged-in instance whose saves never return
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;
    handle.session.stall_saves();

    // WHEN: A credential update is followed by chat sync
    handle.emit(ProtocolEvent::CredsUpdate).await;
    handle
        .emit(ProtocolEvent::ChatsSet(vec![record(
            json!({ "id": "1@s.whatsapp.net", "name": "Ana" }),
        )]))
        .await;

    // THEN: The chats are applied while the save is still pending
    let watched = instance.clone();
    eventually(move || {
        let watched = watched.clone();
        async move { watched.chats().await.len() == 1 }
    })
    .await;
    let session = handle.session.clone();
    eventually(move || {
        let session = session.clone();
        async move { session.calls_to("saveCreds").len() == 1 }
    })
    .await;
}
