//! Boundary to the messaging-protocol library.
//!
//! The library owns the socket, encryption and credential files. The gateway
//! talks to it through [`SessionConnector`] (open a session for an instance)
//! and [`ProtocolSession`] (RPC surface of one open session). Session events
//! arrive on an mpsc channel returned alongside the session.

pub mod bridge;
pub mod content;

pub use content::{MediaKind, OutgoingContent};

use crate::config::BrowserIdentity;
use crate::error::protocol::ProtocolError;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// A library record (chat, contact, message, call) as a JSON object.
pub type Record = Map<String, Value>;

/// Disconnect status codes reported by the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DisconnectReason {
    ConnectionClosed = 428,
    ConnectionLost = 408,
    ConnectionReplaced = 440,
    LoggedOut = 401,
    BadSession = 500,
    RestartRequired = 515,
    MultideviceMismatch = 411,
}

impl DisconnectReason {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// The authenticated account of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

impl ConnectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Open => "open",
            ConnectionPhase::Close => "close",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectInfo {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    #[serde(default)]
    pub connection: Option<ConnectionPhase>,
    #[serde(default)]
    pub last_disconnect: Option<DisconnectInfo>,
    #[serde(default)]
    pub qr: Option<String>,
}

impl ConnectionUpdate {
    pub fn status_code(&self) -> Option<u16> {
        self.last_disconnect.as_ref().and_then(|d| d.status_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageUpsertKind {
    Notify,
    Append,
    Prepend,
    #[serde(other)]
    Other,
}

/// Events the gateway reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    CredsUpdate,
    ChatsSet(Vec<Record>),
    ChatsUpsert(Vec<Record>),
    ChatsUpdate(Vec<Record>),
    ChatsDelete(Vec<String>),
    ContactsSet(Vec<Record>),
    ContactsUpsert(Vec<Record>),
    ContactsUpdate(Vec<Record>),
    Call(Vec<Record>),
    MessagesUpsert {
        kind: MessageUpsertKind,
        messages: Vec<Record>,
    },
    ConnectionUpdate(ConnectionUpdate),
}

impl ProtocolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::CredsUpdate => "creds.update",
            ProtocolEvent::ChatsSet(_) => "chats.set",
            ProtocolEvent::ChatsUpsert(_) => "chats.upsert",
            ProtocolEvent::ChatsUpdate(_) => "chats.update",
            ProtocolEvent::ChatsDelete(_) => "chats.delete",
            ProtocolEvent::ContactsSet(_) => "contacts.set",
            ProtocolEvent::ContactsUpsert(_) => "contacts.upsert",
            ProtocolEvent::ContactsUpdate(_) => "contacts.update",
            ProtocolEvent::Call(_) => "call",
            ProtocolEvent::MessagesUpsert { .. } => "messages.upsert",
            ProtocolEvent::ConnectionUpdate(_) => "connection.update",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationResult {
    pub exists: bool,
    pub jid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupParticipant {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
}

impl GroupParticipant {
    pub fn is_admin(&self) -> bool {
        matches!(self.admin.as_deref(), Some("admin") | Some("superadmin"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
    #[serde(flatten)]
    pub extra: Record,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupAction {
    Add,
    Remove,
    Promote,
    Demote,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupSetting {
    Announcement,
    NotAnnouncement,
    Locked,
    Unlocked,
}

/// Keys needed to fetch encrypted media from the protocol CDN.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    pub media_key: String,
    pub direct_path: String,
    pub url: String,
}

/// Answers the library's resend requests.
pub trait MessageSource: Send + Sync {
    fn get_message(&self, message_id: &str) -> Option<Value>;
}

/// RPC surface of one open protocol session.
#[async_trait]
pub trait ProtocolSession: Send + Sync {
    /// The authenticated account, once the session has logged in.
    fn user(&self) -> Option<SessionUser>;

    async fn save_credentials(&self) -> Result<(), ProtocolError>;

    /// Sends `content` and returns the sent message record.
    async fn send_message(
        &self,
        jid: &str,
        content: &OutgoingContent,
    ) -> Result<Record, ProtocolError>;

    async fn on_whatsapp(&self, jid: &str) -> Result<Vec<RegistrationResult>, ProtocolError>;

    async fn group_create(
        &self,
        subject: &str,
        participants: &[String],
    ) -> Result<GroupMetadata, ProtocolError>;

    async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata, ProtocolError>;

    async fn group_invite_code(&self, group_id: &str) -> Result<String, ProtocolError>;

    async fn group_setting_update(
        &self,
        group_id: &str,
        setting: GroupSetting,
    ) -> Result<(), ProtocolError>;

    async fn group_participants_update(
        &self,
        group_id: &str,
        participants: &[String],
        action: GroupAction,
    ) -> Result<Value, ProtocolError>;

    async fn group_leave(&self, group_id: &str) -> Result<(), ProtocolError>;

    async fn download_media(
        &self,
        descriptor: &MediaDescriptor,
        media_type: MediaKind,
    ) -> Result<Vec<u8>, ProtocolError>;

    async fn logout(&self) -> Result<(), ProtocolError>;

    /// Terminates the session. Never fails; errors are logged by the implementation.
    async fn end(&self, reason: &str, status_code: u16);
}

/// Everything needed to open a session for one instance.
#[derive(Clone)]
pub struct SessionRequest {
    pub instance_key: String,
    pub auth_dir: PathBuf,
    pub browser: BrowserIdentity,
    pub message_source: Arc<dyn MessageSource>,
}

pub struct OpenedSession {
    pub session: Arc<dyn ProtocolSession>,
    pub events: mpsc::Receiver<ProtocolEvent>,
}

#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn open(&self, request: SessionRequest) -> Result<OpenedSession, ProtocolError>;
}
