// Unit tests for outgoing content wire shapes

use crate::protocol::content::{ListRow, ListSection, TemplateButton};
use crate::protocol::{MediaKind, OutgoingContent};

use serde_json::json;

/// **VALUE**: Verifies uploaded audio is sent as a voice note and bytes are base64.
///
/// **BUG THIS CATCHES**: Would catch `ptt` being set for every media kind, which turns
/// images into broken voice notes.
#[test]
fn given_audio_upload_when_to_wire_then_marks_voice_note() {
    // GIVEN: Raw audio bytes
    let content = OutgoingContent::Media {
        kind: MediaKind::Audio,
        data: b"abc".to_vec(),
        mimetype: "audio/ogg".to_string(),
        caption: None,
        file_name: Some("note.ogg".to_string()),
    };

    // WHEN: Building the wire shape
    let wire = content.to_wire();

    // THEN: Base64 payload under the kind key, ptt on, no file name
    assert_eq!(wire["audio"], json!("YWJj"));
    assert_eq!(wire["ptt"], json!(true));
    assert_eq!(wire["mimetype"], json!("audio/ogg"));
    assert!(wire.get("fileName").is_none());
}

#[test]
fn given_document_upload_when_to_wire_then_keeps_file_name() {
    let content = OutgoingContent::Media {
        kind: MediaKind::Document,
        data: Vec::new(),
        mimetype: "application/pdf".to_string(),
        caption: Some("invoice".to_string()),
        file_name: Some("invoice.pdf".to_string()),
    };

    let wire = content.to_wire();

    assert_eq!(wire["fileName"], json!("invoice.pdf"));
    assert_eq!(wire["caption"], json!("invoice"));
    assert_eq!(wire["ptt"], json!(false));
}

#[test]
fn given_url_media_when_to_wire_then_nests_url_under_kind() {
    let content = OutgoingContent::MediaUrl {
        kind: MediaKind::Image,
        url: "https://example.com/a.png".to_string(),
        mimetype: "image/png".to_string(),
        caption: None,
    };

    let wire = content.to_wire();

    assert_eq!(wire["image"], json!({ "url": "https://example.com/a.png" }));
    assert!(wire.get("caption").is_none());
}

#[test]
fn given_location_when_to_wire_then_degrees_and_caption() {
    let content = OutgoingContent::Location {
        latitude: -23.5,
        longitude: -46.6,
        caption: "Office".to_string(),
    };

    let wire = content.to_wire();

    assert_eq!(wire["location"]["degreesLatitude"], json!(-23.5));
    assert_eq!(wire["location"]["degreesLongitude"], json!(-46.6));
    assert_eq!(wire["caption"], json!("Office"));
}

/// **VALUE**: Verifies each button kind maps to the library's template button key.
#[test]
fn given_template_buttons_when_to_wire_then_maps_each_kind() {
    let content = OutgoingContent::TemplateButtons {
        text: "Pick one".to_string(),
        footer: "footer".to_string(),
        buttons: vec![
            TemplateButton::QuickReply {
                display_text: "Yes".to_string(),
            },
            TemplateButton::Url {
                display_text: "Site".to_string(),
                url: "https://example.com".to_string(),
            },
            TemplateButton::Call {
                display_text: "Call".to_string(),
                phone_number: "+5511".to_string(),
            },
        ],
    };

    let wire = content.to_wire();

    let buttons = wire["templateButtons"].as_array().expect("buttons array");
    assert_eq!(buttons[0]["quickReplyButton"]["displayText"], json!("Yes"));
    assert_eq!(buttons[1]["urlButton"]["url"], json!("https://example.com"));
    assert_eq!(buttons[2]["callButton"]["phoneNumber"], json!("+5511"));
    assert_eq!(wire["footer"], json!("footer"));
}

#[test]
fn given_list_when_to_wire_then_rows_use_camel_case() {
    let content = OutgoingContent::List {
        text: "Menu".to_string(),
        title: "Title".to_string(),
        footer: "desc".to_string(),
        button_text: "Open".to_string(),
        sections: vec![ListSection {
            title: "Section".to_string(),
            rows: vec![ListRow {
                title: "Row".to_string(),
                description: String::new(),
                row_id: "r1".to_string(),
            }],
        }],
    };

    let wire = content.to_wire();

    assert_eq!(wire["buttonText"], json!("Open"));
    assert_eq!(wire["sections"][0]["rows"][0]["rowId"], json!("r1"));
    assert_eq!(content.kind(), "list");
}
