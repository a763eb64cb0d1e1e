// Unit tests for send request models

use crate::instance::{Button, ButtonKind, ContactCard, LocationMessage, MediaUrlMessage};
use crate::protocol::MediaKind;

use serde_json::json;

/// **VALUE**: Verifies the vCard layout the protocol server accepts.
///
/// **BUG THIS CATCHES**: Would catch a missing `waid` parameter, which makes the card
/// show a number without the "message" action.
#[test]
fn given_contact_card_when_to_vcard_then_builds_vcard_3() {
    // GIVEN: A card with an organization
    let card = ContactCard {
        full_name: "Ana Silva".to_string(),
        display_name: "Ana".to_string(),
        organization: Some("Acme".to_string()),
        phone_number: "5511999990000".to_string(),
    };

    // WHEN / THEN
    assert_eq!(
        card.to_vcard(),
        "BEGIN:VCARD\nVERSION:3.0\nFN:Ana Silva\nORG:Acme;\nTEL;type=CELL;type=VOICE;waid=5511999990000:5511999990000\nEND:VCARD"
    );
}

#[test]
fn given_card_without_organization_when_to_vcard_then_empty_org() {
    let card = ContactCard {
        full_name: "Bo".to_string(),
        display_name: String::new(),
        organization: None,
        phone_number: "1".to_string(),
    };
    assert!(card.to_vcard().contains("\nORG:;\n"));
}

/// **VALUE**: Verifies request bodies deserialize from their REST field names.
#[test]
fn given_rest_bodies_when_deserialized_then_fields_map() {
    let button: Button =
        serde_json::from_value(json!({ "type": "urlButton", "title": "Go", "payload": "https://x" }))
            .expect("button");
    assert_eq!(button.kind, ButtonKind::UrlButton);
    assert_eq!(button.payload.as_deref(), Some("https://x"));

    let location: LocationMessage = serde_json::from_value(json!({
        "to": "1",
        "caption": "here",
        "coordinates": { "lat": 1.5, "long": 2.5 },
    }))
    .expect("location");
    assert_eq!(location.coordinates.long, 2.5);

    let media: MediaUrlMessage = serde_json::from_value(json!({
        "to": "1",
        "url": "https://example.com/v.mp4",
        "type": "video",
        "mimeType": "video/mp4",
    }))
    .expect("media");
    assert_eq!(media.kind, MediaKind::Video);
    assert!(media.caption.is_none());
}
