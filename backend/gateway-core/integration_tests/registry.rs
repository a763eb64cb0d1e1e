use crate::helpers::{HarnessBuilder, eventually};

use gateway_core::ConnectionStatus;
use gateway_core::error::InstanceError;

/// **VALUE**: Verifies a new instance is listed immediately as connecting.
///
/// **WHY THIS MATTERS**: Clients poll the list right after creating an instance to
/// show its QR view. An instance that is missing or `disconnected` at that point looks
/// like a failed create.
#[tokio::test]
async fn given_new_key_when_create_then_listed_as_connecting() {
    // GIVEN: An empty registry
    let harness = HarnessBuilder::new().build();

    // WHEN: Creating "abc"
    harness.registry.create(Some("abc".to_string()), false).await;

    // THEN: Listed with state "connecting"
    let list = harness.registry.list().await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].key, "abc");
    assert_eq!(list[0].connection_state, ConnectionStatus::Connecting);
    assert_eq!(list[0].connection_state.as_str(), "connecting");
}

#[tokio::test]
async fn given_no_key_when_create_then_generates_uuid_key() {
    let harness = HarnessBuilder::new().build();

    let instance = harness.registry.create(None, true).await;

    assert_eq!(instance.key().len(), 36);
    assert!(instance.disable_webhook());
    assert!(harness.registry.get(instance.key()).await.is_ok());
}

#[tokio::test]
async fn given_unknown_key_when_get_then_not_found() {
    let harness = HarnessBuilder::new().build();

    let result = harness.registry.get("missing").await;

    assert!(matches!(result, Err(InstanceError::NotFound { .. })));
}

/// **VALUE**: Verifies delete logs out, ends the session and forgets the instance.
///
/// **BUG THIS CATCHES**: Would catch a deleted instance lingering in the table and
/// continuing to reconnect in the background.
#[tokio::test]
async fn given_connected_instance_when_delete_then_logged_out_ended_and_removed() {
    // GIVEN: A logged-in instance
    let mut harness = HarnessBuilder::new().build();
    let (_instance, handle) = harness.logged_in("abc").await;
    let session_dir = harness.data_dir.path().join("abc");
    assert!(session_dir.exists());

    // WHEN: Deleting it
    harness.registry.delete("abc").await.expect("delete should succeed");

    // THEN: Logged out, ended, removed from the table and the disk
    assert_eq!(handle.session.calls_to("logout").len(), 1);
    assert_eq!(handle.session.calls_to("end").len(), 1);
    assert!(harness.registry.get("abc").await.is_err());
    assert!(harness.registry.is_empty().await);
    assert!(!session_dir.exists());
}

/// **VALUE**: Verifies reset swaps in a fresh instance under the same key and keeps the
/// webhook setting.
#[tokio::test]
async fn given_instance_when_reset_then_new_session_same_key_and_webhook_flag() {
    // GIVEN: An instance created with webhooks disabled
    let mut harness = HarnessBuilder::new().build();
    harness.registry.create(Some("abc".to_string()), true).await;
    let first = harness.next_session().await;

    // WHEN: Resetting it
    let fresh = harness.registry.reset("abc").await.expect("reset should succeed");

    // THEN: The old session is ended and a new one opens
    let old = first.session.clone();
    eventually(move || {
        let old = old.clone();
        async move { !old.calls_to("end").is_empty() }
    })
    .await;
    let second = harness.next_session().await;
    assert_eq!(second.instance_key, "abc");
    assert!(fresh.disable_webhook());
    assert_eq!(harness.registry.len().await, 1);
}

/// **VALUE**: Verifies delete still forgets the instance when the logout call fails.
///
/// **WHY THIS MATTERS**: Logout is a network call to a server that may already be
/// gone. A delete that stops there leaves an instance nobody can remove.
#[tokio::test]
async fn given_failing_logout_when_delete_then_instance_still_removed() {
    // GIVEN: A logged-in instance whose logout fails
    let mut harness = HarnessBuilder::new().build();
    let (_instance, handle) = harness.logged_in("abc").await;
    handle.session.fail_logout();

    // WHEN: Deleting it
    let result = harness.registry.delete("abc").await;

    // THEN: Succeeds, session ended and instance gone
    assert!(result.is_ok());
    assert_eq!(handle.session.calls_to("logout").len(), 1);
    assert_eq!(handle.session.calls_to("end").len(), 1);
    assert!(harness.registry.is_empty().await);
}

/// **VALUE**: Verifies concurrent resets of one key leave exactly one live session.
///
/// **WHY THIS MATTERS**: An instance overwritten in the table but never retired keeps
/// its socket and reconnect loop with no way to reach it.
///
/// **BUG THIS CATCHES**: Would catch reset inserting its replacement without looking at
/// what it displaced.
#[tokio::test]
async fn given_concurrent_resets_when_both_finish_then_one_live_session() {
    // GIVEN: A connected instance
    let mut harness = HarnessBuilder::new().build();
    let (_instance, original) = harness.connected("abc").await;

    // WHEN: Two resets race
    let (first, second) = tokio::join!(
        harness.registry.reset("abc"),
        harness.registry.reset("abc")
    );

    // THEN: Both succeed and the table holds one entry
    assert!(first.is_ok() && second.is_ok());
    assert_eq!(harness.registry.len().await, 1);

    // AND: Of every session opened, only one is left running
    let mut sessions = vec![original.session.clone()];
    sessions.push(harness.next_session().await.session);
    sessions.push(harness.next_session().await.session);
    eventually(move || {
        let sessions = sessions.clone();
        async move {
            sessions
                .iter()
                .filter(|s| s.calls_to("end").is_empty())
                .count()
                == 1
        }
    })
    .await;
}

#[tokio::test]
async fn given_missing_key_when_delete_or_reset_then_not_found() {
    let harness = HarnessBuilder::new().build();

    assert!(harness.registry.delete("nope").await.is_err());
    assert!(harness.registry.reset("nope").await.is_err());
    assert!(harness.registry.logout("nope").await.is_err());
}

/// **VALUE**: Verifies restore recreates one instance per credentials directory and
/// ignores the sentinel file, plain files and the webhook config directory.
///
/// **BUG THIS CATCHES**: Would catch `webhooks` being restored as an instance, which
/// then tries to log in with a directory of JSON files as credentials.
#[tokio::test]
async fn given_data_dir_when_restore_then_only_session_dirs_become_instances() {
    // GIVEN: Two session dirs plus entries that must be skipped
    let mut harness = HarnessBuilder::new().build();
    let root = harness.data_dir.path();
    std::fs::create_dir(root.join("alpha")).expect("mkdir");
    std::fs::create_dir(root.join("beta")).expect("mkdir");
    std::fs::create_dir(root.join("webhooks")).expect("mkdir");
    std::fs::write(root.join(".gitkeep"), "").expect("write");
    std::fs::write(root.join("notes.txt"), "x").expect("write");

    // WHEN: Restoring
    let restored = harness.registry.restore().await.expect("restore should succeed");

    // THEN: Exactly the two session dirs
    assert_eq!(restored, 2);
    let keys: Vec<String> = harness
        .registry
        .list()
        .await
        .into_iter()
        .map(|s| s.key)
        .collect();
    assert_eq!(keys, vec!["alpha".to_string(), "beta".to_string()]);
    harness.next_session().await;
    harness.next_session().await;
}

#[tokio::test]
async fn given_missing_data_dir_when_restore_then_creates_it_and_restores_nothing() {
    let target = tempfile::TempDir::new().expect("temp dir");
    let data_dir = target.path().join("fresh");
    let harness = HarnessBuilder::new()
        .configure(|c| c.data_dir = data_dir.clone())
        .build();

    let restored = harness.registry.restore().await.expect("restore should succeed");

    assert_eq!(restored, 0);
    assert!(data_dir.is_dir());
}
