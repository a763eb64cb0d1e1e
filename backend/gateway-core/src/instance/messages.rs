use crate::error::instance::InstanceError;
use crate::instance::Instance;
use crate::jid;
use crate::protocol::content::{ListSection, TemplateButton};
use crate::protocol::{
    MediaDescriptor, MediaKind, OutgoingContent, ProtocolSession, Record, RegistrationResult,
};

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

const NOT_REGISTERED: &str = "Number not registered on WhatsApp";
const USER_NOT_REGISTERED: &str = "User not registered on WhatsApp";
const DOWNLOAD_FAILED: &str = "Unable to download file";

// ============================================
// REQUEST MODELS
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ButtonKind {
    ReplyButton,
    UrlButton,
    CallButton,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Button {
    #[serde(rename = "type")]
    pub kind: ButtonKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub payload: Option<String>,
}

impl Button {
    fn to_template(&self) -> TemplateButton {
        let display_text = self.title.clone();
        let payload = self.payload.clone().unwrap_or_default();
        match self.kind {
            ButtonKind::ReplyButton => TemplateButton::QuickReply { display_text },
            ButtonKind::CallButton => TemplateButton::Call {
                display_text,
                phone_number: payload,
            },
            ButtonKind::UrlButton => TemplateButton::Url {
                display_text,
                url: payload,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ButtonMessage {
    pub to: String,
    #[serde(default)]
    pub text: String,
    pub buttons: Vec<Button>,
    #[serde(default)]
    pub footer_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ButtonMediaMessage {
    pub to: String,
    #[serde(default)]
    pub text: String,
    pub buttons: Vec<Button>,
    #[serde(default)]
    pub footer_text: String,
    pub image_url: String,
    pub media_type: MediaKind,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub long: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationMessage {
    pub to: String,
    #[serde(default)]
    pub caption: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactCard {
    pub full_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub organization: Option<String>,
    pub phone_number: String,
}

impl ContactCard {
    pub fn to_vcard(&self) -> String {
        format!(
            "BEGIN:VCARD\nVERSION:3.0\nFN:{name}\nORG:{org};\nTEL;type=CELL;type=VOICE;waid={phone}:{phone}\nEND:VCARD",
            name = self.full_name,
            org = self.organization.as_deref().unwrap_or_default(),
            phone = self.phone_number,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VCardMessage {
    pub to: String,
    pub vcard: ContactCard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListMessage {
    pub to: String,
    pub button_text: String,
    pub text: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub sections: Vec<ListSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaUrlMessage {
    pub to: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(default)]
    pub caption: Option<String>,
    pub mime_type: String,
}

/// Uploaded file to send as media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub to: String,
    pub kind: MediaKind,
    pub data: Vec<u8>,
    pub mimetype: String,
    pub caption: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SendOutcome {
    Sent(Record),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BulkSendReport {
    /// Registered recipients a send was attempted for.
    pub sent: usize,
    /// Recipients left out because they are not registered.
    pub failed: usize,
    pub data: BTreeMap<String, SendOutcome>,
}

// ============================================
// SENDS
// ============================================

impl Instance {
    /// Registration lookup. Group and anonymized ids are always reported as
    /// existing.
    pub async fn is_registered(&self, raw: &str) -> Result<RegistrationResult, InstanceError> {
        if jid::skips_registration(raw) {
            return Ok(RegistrationResult {
                exists: true,
                jid: raw.to_string(),
            });
        }

        let session = self.logged_in_session().await?;
        let id = jid::create_id(raw);
        let result = session.on_whatsapp(&id).await?.into_iter().next();
        Ok(result.unwrap_or(RegistrationResult {
            exists: false,
            jid: id,
        }))
    }

    async fn ensure_registered(&self, to: &str, message: &str) -> Result<(), InstanceError> {
        if self.is_registered(to).await?.exists {
            Ok(())
        } else {
            Err(InstanceError::permission_denied(message))
        }
    }

    /// Sends and records the content for resend requests.
    async fn dispatch(
        &self,
        session: &dyn ProtocolSession,
        to: &str,
        content: OutgoingContent,
    ) -> Result<Record, InstanceError> {
        let id = jid::create_id(to);
        let sent = session.send_message(&id, &content).await?;
        self.retry.record(&sent, content.to_wire());
        debug!("{} sent {} message to {}", self.key, content.kind(), id);
        Ok(sent)
    }

    pub async fn send_text(&self, to: &str, text: &str) -> Result<Record, InstanceError> {
        self.ensure_registered(to, NOT_REGISTERED).await?;
        let session = self.logged_in_session().await?;
        self.dispatch(
            session.as_ref(),
            to,
            OutgoingContent::Text {
                text: text.to_string(),
            },
        )
        .await
    }

    /// Sends `text` to every registered recipient concurrently. Unregistered
    /// recipients are only counted.
    pub async fn send_text_bulk(
        &self,
        recipients: &[String],
        text: &str,
    ) -> Result<BulkSendReport, InstanceError> {
        let session = self.logged_in_session().await?;

        let checks = join_all(recipients.iter().map(|to| self.is_registered(to))).await;
        let mut registered = Vec::new();
        let mut failed = 0;
        for (to, check) in recipients.iter().zip(checks) {
            match check {
                Ok(result) if result.exists => registered.push(to),
                Ok(_) => failed += 1,
                Err(e) => {
                    warn!("Registration check for {} failed: {}", to, e);
                    failed += 1;
                }
            }
        }

        let sends = join_all(registered.iter().map(|to| {
            self.dispatch(
                session.as_ref(),
                to,
                OutgoingContent::Text {
                    text: text.to_string(),
                },
            )
        }))
        .await;

        let mut data = BTreeMap::new();
        for (to, outcome) in registered.iter().zip(sends) {
            let outcome = match outcome {
                Ok(sent) => SendOutcome::Sent(sent),
                Err(e) => {
                    warn!("Bulk send to {} failed: {}", to, e);
                    SendOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            data.insert((*to).clone(), outcome);
        }

        info!(
            "{} bulk send: {} sent, {} not registered",
            self.key,
            registered.len(),
            failed
        );
        Ok(BulkSendReport {
            sent: registered.len(),
            failed,
            data,
        })
    }

    pub async fn send_media(&self, upload: MediaUpload) -> Result<Record, InstanceError> {
        self.ensure_registered(&upload.to, USER_NOT_REGISTERED)
            .await?;
        let session = self.logged_in_session().await?;
        let content = OutgoingContent::Media {
            kind: upload.kind,
            data: upload.data,
            mimetype: upload.mimetype,
            caption: upload.caption,
            file_name: upload.file_name,
        };
        self.dispatch(session.as_ref(), &upload.to, content).await
    }

    pub async fn send_url_media(&self, message: MediaUrlMessage) -> Result<Record, InstanceError> {
        self.ensure_registered(&message.to, NOT_REGISTERED).await?;
        let session = self.logged_in_session().await?;
        let content = OutgoingContent::MediaUrl {
            kind: message.kind,
            url: message.url,
            mimetype: message.mime_type,
            caption: message.caption,
        };
        self.dispatch(session.as_ref(), &message.to, content).await
    }

    pub async fn send_url_media_buttons(
        &self,
        message: ButtonMediaMessage,
    ) -> Result<Record, InstanceError> {
        self.ensure_registered(&message.to, NOT_REGISTERED).await?;
        let session = self.logged_in_session().await?;
        let content = OutgoingContent::MediaTemplateButtons {
            kind: message.media_type,
            url: message.image_url,
            mimetype: message.mime_type,
            caption: message.text,
            footer: message.footer_text,
            buttons: message.buttons.iter().map(Button::to_template).collect(),
        };
        self.dispatch(session.as_ref(), &message.to, content).await
    }

    /// Send failures are logged and reported as `Ok(None)`.
    pub async fn send_buttons(
        &self,
        message: ButtonMessage,
    ) -> Result<Option<Record>, InstanceError> {
        self.ensure_registered(&message.to, NOT_REGISTERED).await?;
        let session = self.logged_in_session().await?;
        let content = OutgoingContent::TemplateButtons {
            text: message.text,
            footer: message.footer_text,
            buttons: message.buttons.iter().map(Button::to_template).collect(),
        };
        Ok(self
            .dispatch(session.as_ref(), &message.to, content)
            .await
            .inspect_err(|e| warn!("Button message to {} not sent: {}", message.to, e))
            .ok())
    }

    /// No registration check. Send failures are logged and reported as `Ok(None)`.
    pub async fn send_location(
        &self,
        message: LocationMessage,
    ) -> Result<Option<Record>, InstanceError> {
        let session = self.logged_in_session().await?;
        let content = OutgoingContent::Location {
            latitude: message.coordinates.lat,
            longitude: message.coordinates.long,
            caption: message.caption,
        };
        Ok(self
            .dispatch(session.as_ref(), &message.to, content)
            .await
            .inspect_err(|e| warn!("Location message to {} not sent: {}", message.to, e))
            .ok())
    }

    pub async fn send_contact(&self, message: VCardMessage) -> Result<Record, InstanceError> {
        let session = self.logged_in_session().await?;
        let content = OutgoingContent::Contact {
            display_name: message.vcard.full_name.clone(),
            vcard: message.vcard.to_vcard(),
        };
        self.dispatch(session.as_ref(), &message.to, content).await
    }

    pub async fn send_list(&self, message: ListMessage) -> Result<Record, InstanceError> {
        let session = self.logged_in_session().await?;
        let content = OutgoingContent::List {
            text: message.text,
            title: message.title,
            footer: message.description,
            button_text: message.button_text,
            sections: message.sections,
        };
        self.dispatch(session.as_ref(), &message.to, content).await
    }

    /// Downloads media referenced by a received message, base64 encoded.
    pub async fn download_media(
        &self,
        descriptor: &MediaDescriptor,
        media_type: MediaKind,
    ) -> Result<String, InstanceError> {
        let session = self.logged_in_session().await?;
        match session.download_media(descriptor, media_type).await {
            Ok(bytes) => Ok(STANDARD.encode(bytes)),
            Err(e) => {
                warn!("Media download for {} failed: {}", self.key, e);
                Err(InstanceError::permission_denied(DOWNLOAD_FAILED))
            }
        }
    }
}
