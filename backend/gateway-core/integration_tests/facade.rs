use crate::helpers::{HarnessBuilder, seed_group};

use gateway_core::error::InstanceError;
use gateway_core::instance::{
    Button, ButtonKind, ButtonMediaMessage, ButtonMessage, ContactCard, Coordinates,
    LocationMessage, ParticipantUpdateOutcome, SendOutcome, VCardMessage,
};
use gateway_core::protocol::{GroupAction, GroupSetting, MediaDescriptor, MediaKind};

use std::time::Duration;

// ============================================
// SENDS
// ============================================

#[tokio::test]
async fn given_registered_recipient_when_send_text_then_sent_to_normalized_id() {
    // GIVEN: A logged-in instance and a registered number
    let mut harness = HarnessBuilder::new().registered(&["111"]).build();
    let (instance, handle) = harness.logged_in("abc").await;

    // WHEN: Sending text to the bare number
    let sent = instance.send_text("111", "hello").await.expect("send should succeed");

    // THEN: Sent to the full identifier
    assert_eq!(sent["key"]["remoteJid"], "111@s.whatsapp.net");
    let sends = handle.session.calls_to("sendMessage");
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].arg, "111@s.whatsapp.net");
}

/// **VALUE**: Verifies unregistered recipients are refused before any send.
///
/// **BUG THIS CATCHES**: Would catch the registration check being skipped, which makes
/// the server silently drop messages while the API reports success.
#[tokio::test]
async fn given_unregistered_recipient_when_send_text_then_permission_denied_without_send() {
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;

    let result = instance.send_text("222", "hello").await;

    match result {
        Err(InstanceError::PermissionDenied { message, .. }) => {
            assert_eq!(message, "Number not registered on WhatsApp")
        }
        other => panic!("Expected PermissionDenied, got {other:?}"),
    }
    assert!(handle.session.calls_to("sendMessage").is_empty());
}

#[tokio::test]
async fn given_not_logged_in_when_send_text_then_unauthenticated() {
    let mut harness = HarnessBuilder::new().registered(&["111"]).build();
    let (instance, _handle) = harness.connected("abc").await;

    let result = instance.send_text("111", "hello").await;

    assert!(matches!(result, Err(InstanceError::Unauthenticated { .. })));
}

#[tokio::test]
async fn given_group_recipient_when_send_text_then_skips_registration_lookup() {
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;

    instance
        .send_text("1-2@g.us", "hi all")
        .await
        .expect("send should succeed");

    assert!(handle.session.calls_to("onWhatsApp").is_empty());
    assert_eq!(handle.session.calls_to("sendMessage")[0].arg, "1-2@g.us");
}

/// **VALUE**: Verifies bulk send counts registered and unregistered recipients and
/// reports a result per registered recipient.
#[tokio::test]
async fn given_mixed_recipients_when_bulk_send_then_counts_and_results() {
    // GIVEN: Two of three recipients are registered
    let mut harness = HarnessBuilder::new().registered(&["111", "333"]).build();
    let (instance, handle) = harness.logged_in("abc").await;
    let recipients = vec!["111".to_string(), "222".to_string(), "333".to_string()];

    // WHEN: Bulk sending
    let report = instance
        .send_text_bulk(&recipients, "promo")
        .await
        .expect("bulk send should succeed");

    // THEN: 2 sent, 1 failed, results for the registered ones only
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.data.len(), 2);
    assert!(matches!(report.data.get("111"), Some(SendOutcome::Sent(_))));
    assert!(report.data.get("222").is_none());
    assert_eq!(handle.session.calls_to("sendMessage").len(), 2);
}

fn buttons() -> Vec<Button> {
    vec![Button {
        kind: ButtonKind::ReplyButton,
        title: "Yes".to_string(),
        payload: None,
    }]
}

/// **VALUE**: Verifies plain button sends swallow protocol failures while button sends
/// with media propagate them.
#[tokio::test]
async fn given_failing_send_when_buttons_then_swallowed_but_media_buttons_propagate() {
    // GIVEN: A registered recipient whose sends fail at the server
    let mut harness = HarnessBuilder::new().registered(&["fail1"]).build();
    let (instance, _handle) = harness.logged_in("abc").await;

    // WHEN: Sending plain buttons
    let plain = instance
        .send_buttons(ButtonMessage {
            to: "fail1".to_string(),
            text: "Pick".to_string(),
            buttons: buttons(),
            footer_text: String::new(),
        })
        .await;

    // THEN: Ok(None)
    assert!(matches!(plain, Ok(None)));

    // WHEN: Sending buttons with media
    let with_media = instance
        .send_url_media_buttons(ButtonMediaMessage {
            to: "fail1".to_string(),
            text: "Pick".to_string(),
            buttons: buttons(),
            footer_text: String::new(),
            image_url: "https://example.com/a.png".to_string(),
            media_type: MediaKind::Image,
            mime_type: "image/png".to_string(),
        })
        .await;

    // THEN: The protocol error surfaces
    assert!(matches!(with_media, Err(InstanceError::Protocol { .. })));
}

/// **VALUE**: Verifies location and contact sends skip the registration lookup.
#[tokio::test]
async fn given_unregistered_recipient_when_location_or_contact_then_sent_without_lookup() {
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;

    let location = instance
        .send_location(LocationMessage {
            to: "222".to_string(),
            caption: "Office".to_string(),
            coordinates: Coordinates {
                lat: -23.5,
                long: -46.6,
            },
        })
        .await
        .expect("location should not fail");
    assert!(location.is_some());

    instance
        .send_contact(VCardMessage {
            to: "222".to_string(),
            vcard: ContactCard {
                full_name: "Ana".to_string(),
                display_name: "Ana".to_string(),
                organization: None,
                phone_number: "5511".to_string(),
            },
        })
        .await
        .expect("contact should send");

    assert!(handle.session.calls_to("onWhatsApp").is_empty());
    assert_eq!(handle.session.calls_to("sendMessage").len(), 2);
}

#[tokio::test]
async fn given_media_descriptor_when_download_then_base64_or_permission_denied() {
    let mut harness = HarnessBuilder::new().build();
    let (instance, _handle) = harness.logged_in("abc").await;
    let mut descriptor = MediaDescriptor {
        media_key: "k".to_string(),
        direct_path: "/p".to_string(),
        url: "https://cdn.example.com/m".to_string(),
    };

    let data = instance
        .download_media(&descriptor, MediaKind::Image)
        .await
        .expect("download should succeed");
    assert_eq!(data, "bWVkaWE=");

    descriptor.url = String::new();
    let failed = instance.download_media(&descriptor, MediaKind::Image).await;
    assert!(matches!(failed, Err(InstanceError::PermissionDenied { .. })));
}

#[tokio::test]
async fn given_anonymized_id_when_is_registered_then_exists_without_lookup() {
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;

    let result = instance.is_registered("77@lid").await.expect("lookup");

    assert!(result.exists);
    assert!(handle.session.calls_to("onWhatsApp").is_empty());
}

// ============================================
// GROUPS
// ============================================

/// **VALUE**: Verifies group mutation on an uncached group fails before any protocol
/// call.
///
/// **BUG THIS CATCHES**: Would catch membership changes being attempted on a group the
/// account is not in, which the server answers with rate-limit strikes.
#[tokio::test]
async fn given_uncached_group_when_update_group_then_not_found_without_protocol_call() {
    // GIVEN: No chat "g1@g.us"
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;

    // WHEN: Adding members
    let result = instance
        .update_group(
            "g1@g.us",
            &["111".to_string(), "222".to_string()],
            GroupAction::Add,
        )
        .await;

    // THEN: NotFound and no calls at all
    assert!(matches!(result, Err(InstanceError::NotFound { .. })));
    assert!(handle.session.calls_to("groupParticipantsUpdate").is_empty());
}

/// **VALUE**: Verifies membership updates are paced, processed in input order and
/// survive a failing participant.
///
/// **WHY THIS MATTERS**: The protocol server rate-limits membership changes. Firing
/// them back to back gets the account temporarily banned from group admin actions.
#[tokio::test]
async fn given_cached_group_when_update_group_then_paced_ordered_and_complete() {
    // GIVEN: A cached group and a short pacing delay
    let mut harness = HarnessBuilder::new()
        .configure(|c| c.limits.group_update_delay_ms = 60)
        .build();
    let (instance, handle) = harness.logged_in("abc").await;
    seed_group(&instance, &handle, "1-2@g.us").await;
    let users = vec!["111".to_string(), "666".to_string(), "222".to_string()];

    // WHEN: Updating three members, the second of which fails
    let outcomes = instance
        .update_group("1-2@g.us", &users, GroupAction::Add)
        .await
        .expect("update should run");

    // THEN: One outcome per user, in order, failure included
    assert_eq!(outcomes.len(), 3);
    assert!(matches!(&outcomes[0], ParticipantUpdateOutcome::Ok { participant, .. } if participant == "111@s.whatsapp.net"));
    assert!(matches!(&outcomes[1], ParticipantUpdateOutcome::Error { participant, .. } if participant == "666@s.whatsapp.net"));
    assert!(matches!(&outcomes[2], ParticipantUpdateOutcome::Ok { .. }));

    // AND: Calls are spaced by at least the delay
    let calls = handle.session.calls_to("groupParticipantsUpdate");
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(60));
    }
}

#[tokio::test]
async fn given_cached_group_when_settings_invite_and_leave_then_forwarded() {
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;
    seed_group(&instance, &handle, "1-2@g.us").await;

    instance
        .change_group_settings("1-2@g.us", GroupSetting::Announcement)
        .await
        .expect("settings");
    let code = instance
        .get_group_invite_code("1-2@g.us")
        .await
        .expect("invite code");
    instance.leave_group("1-2@g.us").await.expect("leave");

    assert_eq!(code, "INVITE123");
    assert_eq!(handle.session.calls_to("groupSettingUpdate").len(), 1);
    assert_eq!(handle.session.calls_to("groupLeave").len(), 1);
    assert!(instance.leave_group("9-9@g.us").await.is_err());
}

#[tokio::test]
async fn given_failing_metadata_when_get_group_info_then_none_or_not_found() {
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;
    seed_group(&instance, &handle, "gone-1@g.us").await;

    let lenient = instance.get_group_info("gone-1@g.us", false).await;
    let strict = instance.get_group_info("gone-1@g.us", true).await;

    assert!(matches!(lenient, Ok(None)));
    assert!(matches!(strict, Err(InstanceError::NotFound { .. })));
}

/// **VALUE**: Verifies admin filtering compares against the device-less account id and
/// strips participant lists on request.
#[tokio::test]
async fn given_groups_when_get_admin_groups_then_only_admin_groups_returned() {
    // GIVEN: One group where the account is admin, one where it is not
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;
    seed_group(&instance, &handle, "admin-1@g.us").await;
    seed_group(&instance, &handle, "plain-1@g.us").await;

    // WHEN: Listing admin groups with and without participants
    let bare = instance.get_admin_groups(false).await.expect("admin groups");
    let full = instance.get_admin_groups(true).await.expect("admin groups");

    // THEN: Only the admin group
    assert_eq!(bare.len(), 1);
    assert_eq!(bare[0].id, "admin-1@g.us");
    assert!(bare[0].participants.is_empty());
    assert_eq!(full[0].participants.len(), 2);
    assert_eq!(instance.get_all_groups().await.len(), 2);
}

#[tokio::test]
async fn given_participants_when_create_group_then_ids_normalized() {
    let mut harness = HarnessBuilder::new().build();
    let (instance, handle) = harness.logged_in("abc").await;

    let group = instance
        .create_group("Team", &["111".to_string(), "222".to_string()])
        .await
        .expect("create group");

    assert_eq!(group.subject.as_deref(), Some("Team"));
    assert_eq!(
        handle.session.calls_to("groupCreate")[0].arg,
        "111@s.whatsapp.net,222@s.whatsapp.net"
    );
}
