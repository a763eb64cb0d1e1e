use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListRow {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub row_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// Hydrated template button as the library expects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateButton {
    QuickReply { display_text: String },
    Call { display_text: String, phone_number: String },
    Url { display_text: String, url: String },
}

impl TemplateButton {
    fn to_wire(&self) -> Value {
        match self {
            TemplateButton::QuickReply { display_text } => {
                json!({ "quickReplyButton": { "displayText": display_text } })
            }
            TemplateButton::Call {
                display_text,
                phone_number,
            } => json!({
                "callButton": { "displayText": display_text, "phoneNumber": phone_number }
            }),
            TemplateButton::Url { display_text, url } => {
                json!({ "urlButton": { "displayText": display_text, "url": url } })
            }
        }
    }
}

/// One variant per message kind the facade can send.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingContent {
    Text {
        text: String,
    },
    Media {
        kind: MediaKind,
        data: Vec<u8>,
        mimetype: String,
        caption: Option<String>,
        file_name: Option<String>,
    },
    MediaUrl {
        kind: MediaKind,
        url: String,
        mimetype: String,
        caption: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        caption: String,
    },
    Contact {
        display_name: String,
        vcard: String,
    },
    List {
        text: String,
        title: String,
        footer: String,
        button_text: String,
        sections: Vec<ListSection>,
    },
    TemplateButtons {
        text: String,
        footer: String,
        buttons: Vec<TemplateButton>,
    },
    MediaTemplateButtons {
        kind: MediaKind,
        url: String,
        mimetype: String,
        caption: String,
        footer: String,
        buttons: Vec<TemplateButton>,
    },
}

impl OutgoingContent {
    pub fn kind(&self) -> &'static str {
        match self {
            OutgoingContent::Text { .. } => "text",
            OutgoingContent::Media { .. } => "media",
            OutgoingContent::MediaUrl { .. } => "media_url",
            OutgoingContent::Location { .. } => "location",
            OutgoingContent::Contact { .. } => "contact",
            OutgoingContent::List { .. } => "list",
            OutgoingContent::TemplateButtons { .. } => "buttons",
            OutgoingContent::MediaTemplateButtons { .. } => "media_buttons",
        }
    }

    /// Library JSON shape. Raw media bytes are base64 encoded.
    pub fn to_wire(&self) -> Value {
        match self {
            OutgoingContent::Text { text } => json!({ "text": text }),
            OutgoingContent::Media {
                kind,
                data,
                mimetype,
                caption,
                file_name,
            } => {
                let mut wire = Map::new();
                wire.insert("mimetype".into(), json!(mimetype));
                wire.insert(kind.as_str().into(), json!(STANDARD.encode(data)));
                if let Some(caption) = caption {
                    wire.insert("caption".into(), json!(caption));
                }
                wire.insert("ptt".into(), json!(*kind == MediaKind::Audio));
                if *kind == MediaKind::Document
                    && let Some(file_name) = file_name
                {
                    wire.insert("fileName".into(), json!(file_name));
                }
                Value::Object(wire)
            }
            OutgoingContent::MediaUrl {
                kind,
                url,
                mimetype,
                caption,
            } => {
                let mut wire = Map::new();
                wire.insert(kind.as_str().into(), json!({ "url": url }));
                if let Some(caption) = caption {
                    wire.insert("caption".into(), json!(caption));
                }
                wire.insert("mimetype".into(), json!(mimetype));
                Value::Object(wire)
            }
            OutgoingContent::Location {
                latitude,
                longitude,
                caption,
            } => json!({
                "location": { "degreesLatitude": latitude, "degreesLongitude": longitude },
                "text": caption,
                "caption": caption,
            }),
            OutgoingContent::Contact {
                display_name,
                vcard,
            } => json!({
                "contacts": {
                    "displayName": display_name,
                    "contacts": [{ "displayName": display_name, "vcard": vcard }],
                }
            }),
            OutgoingContent::List {
                text,
                title,
                footer,
                button_text,
                sections,
            } => json!({
                "text": text,
                "sections": sections,
                "buttonText": button_text,
                "footer": footer,
                "title": title,
            }),
            OutgoingContent::TemplateButtons {
                text,
                footer,
                buttons,
            } => json!({
                "templateButtons": buttons.iter().map(TemplateButton::to_wire).collect::<Vec<_>>(),
                "text": text,
                "footer": footer,
            }),
            OutgoingContent::MediaTemplateButtons {
                kind,
                url,
                mimetype,
                caption,
                footer,
                buttons,
            } => {
                let mut wire = Map::new();
                wire.insert(kind.as_str().into(), json!({ "url": url }));
                wire.insert("footer".into(), json!(footer));
                wire.insert("caption".into(), json!(caption));
                wire.insert(
                    "templateButtons".into(),
                    Value::Array(buttons.iter().map(TemplateButton::to_wire).collect()),
                );
                wire.insert("mimetype".into(), json!(mimetype));
                Value::Object(wire)
            }
        }
    }
}
