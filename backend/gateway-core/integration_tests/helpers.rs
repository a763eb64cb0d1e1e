//! Test helpers for orchestration integration tests.
//!
//! This module provides an in-memory protocol library:
//! - `FakeConnector` hands out one `FakeSession` per connect
//! - every open is reported on a channel so tests can inject events
//! - `FakeSession` records each RPC with the (virtual) time it happened

use gateway_core::config::GatewayConfig;
use gateway_core::error::{NotifyError, ProtocolError};
use gateway_core::protocol::{
    ConnectionPhase, ConnectionUpdate, DisconnectInfo, GroupAction, GroupMetadata,
    GroupParticipant, GroupSetting, MediaDescriptor, MediaKind, OpenedSession, OutgoingContent,
    ProtocolEvent, ProtocolSession, Record, RegistrationResult, SessionConnector, SessionRequest,
    SessionUser,
};
use gateway_core::qr::QrRenderer;
use gateway_core::{Instance, InstanceDeps, Registry};

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Account every fake session logs in as.
pub const OWN_JID: &str = "5500000000001:7@s.whatsapp.net";

/// One recorded RPC.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub arg: String,
    pub at: Instant,
}

pub struct FakeSession {
    registered: HashSet<String>,
    calls: Mutex<Vec<Call>>,
    sent: AtomicUsize,
    logged_out: Mutex<bool>,
    fail_logout: AtomicBool,
    stall_saves: AtomicBool,
}

impl FakeSession {
    fn new(registered: HashSet<String>) -> Self {
        Self {
            registered,
            calls: Mutex::new(Vec::new()),
            sent: AtomicUsize::new(0),
            logged_out: Mutex::new(false),
            fail_logout: AtomicBool::new(false),
            stall_saves: AtomicBool::new(false),
        }
    }

    fn record(&self, method: &'static str, arg: impl Into<String>) {
        self.calls.lock().expect("calls lock").push(Call {
            method,
            arg: arg.into(),
            at: Instant::now(),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Makes every later `logout` fail.
    pub fn fail_logout(&self) {
        self.fail_logout.store(true, Ordering::SeqCst);
    }

    /// Makes every later credential save hang, like an RPC whose reply never
    /// arrives.
    pub fn stall_saves(&self) {
        self.stall_saves.store(true, Ordering::SeqCst);
    }

    pub fn calls_to(&self, method: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }
}

#[async_trait]
impl ProtocolSession for FakeSession {
    fn user(&self) -> Option<SessionUser> {
        if *self.logged_out.lock().expect("logout lock") {
            return None;
        }
        Some(SessionUser {
            id: OWN_JID.to_string(),
            name: Some("Gateway Test".to_string()),
            lid: None,
        })
    }

    async fn save_credentials(&self) -> Result<(), ProtocolError> {
        self.record("saveCreds", "");
        if self.stall_saves.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn send_message(
        &self,
        jid: &str,
        content: &OutgoingContent,
    ) -> Result<Record, ProtocolError> {
        self.record("sendMessage", jid);
        if jid.starts_with("fail") {
            return Err(ProtocolError::rpc("sendMessage", "rejected by server"));
        }
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        match json!({
            "key": { "id": format!("SENT{n}"), "remoteJid": jid, "fromMe": true },
            "message": content.to_wire(),
        }) {
            Value::Object(map) => Ok(map),
            _ => unreachable!(),
        }
    }

    async fn on_whatsapp(&self, jid: &str) -> Result<Vec<RegistrationResult>, ProtocolError> {
        self.record("onWhatsApp", jid);
        if self.registered.contains(jid) {
            Ok(vec![RegistrationResult {
                exists: true,
                jid: jid.to_string(),
            }])
        } else {
            Ok(Vec::new())
        }
    }

    async fn group_create(
        &self,
        subject: &str,
        participants: &[String],
    ) -> Result<GroupMetadata, ProtocolError> {
        self.record("groupCreate", participants.join(","));
        Ok(GroupMetadata {
            id: "120363000000000001@g.us".to_string(),
            subject: Some(subject.to_string()),
            participants: participants
                .iter()
                .map(|id| GroupParticipant {
                    id: id.clone(),
                    admin: None,
                })
                .collect(),
            extra: Record::new(),
        })
    }

    async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata, ProtocolError> {
        self.record("groupMetadata", group_id);
        if group_id.starts_with("gone") {
            return Err(ProtocolError::rpc("groupMetadata", "item-not-found"));
        }
        let admin = if group_id.starts_with("admin") {
            Some("admin".to_string())
        } else {
            None
        };
        Ok(GroupMetadata {
            id: group_id.to_string(),
            subject: Some("Team".to_string()),
            participants: vec![
                GroupParticipant {
                    id: "5500000000001@s.whatsapp.net".to_string(),
                    admin,
                },
                GroupParticipant {
                    id: "5599999999999@s.whatsapp.net".to_string(),
                    admin: None,
                },
            ],
            extra: Record::new(),
        })
    }

    async fn group_invite_code(&self, group_id: &str) -> Result<String, ProtocolError> {
        self.record("groupInviteCode", group_id);
        Ok("INVITE123".to_string())
    }

    async fn group_setting_update(
        &self,
        group_id: &str,
        _setting: GroupSetting,
    ) -> Result<(), ProtocolError> {
        self.record("groupSettingUpdate", group_id);
        Ok(())
    }

    async fn group_participants_update(
        &self,
        _group_id: &str,
        participants: &[String],
        action: GroupAction,
    ) -> Result<Value, ProtocolError> {
        let participant = participants.join(",");
        self.record("groupParticipantsUpdate", participant.clone());
        if participant.starts_with("666") {
            return Err(ProtocolError::rpc("groupParticipantsUpdate", "forbidden"));
        }
        Ok(json!([{ "status": "200", "jid": participant, "action": action }]))
    }

    async fn group_leave(&self, group_id: &str) -> Result<(), ProtocolError> {
        self.record("groupLeave", group_id);
        Ok(())
    }

    async fn download_media(
        &self,
        descriptor: &MediaDescriptor,
        _media_type: MediaKind,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.record("downloadMedia", descriptor.url.clone());
        if descriptor.url.is_empty() {
            return Err(ProtocolError::rpc("downloadMedia", "no url"));
        }
        Ok(b"media".to_vec())
    }

    async fn logout(&self) -> Result<(), ProtocolError> {
        self.record("logout", "");
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(ProtocolError::rpc("logout", "connection lost"));
        }
        *self.logged_out.lock().expect("logout lock") = true;
        Ok(())
    }

    async fn end(&self, reason: &str, status_code: u16) {
        self.record("end", format!("{status_code}:{reason}"));
    }
}

/// An opened fake session plus the sender feeding its event stream.
pub struct FakeHandle {
    pub instance_key: String,
    pub session: Arc<FakeSession>,
    pub events: mpsc::Sender<ProtocolEvent>,
}

impl FakeHandle {
    pub async fn emit(&self, event: ProtocolEvent) {
        self.events.send(event).await.expect("event loop alive");
    }

    pub async fn open(&self) {
        self.emit(connection(Some(ConnectionPhase::Open), None, None))
            .await;
    }

    pub async fn close(&self, status_code: u16) {
        self.emit(connection(Some(ConnectionPhase::Close), Some(status_code), None))
            .await;
    }

    pub async fn qr(&self, payload: &str) {
        self.emit(connection(None, None, Some(payload))).await;
    }
}

pub fn connection(
    phase: Option<ConnectionPhase>,
    status_code: Option<u16>,
    qr: Option<&str>,
) -> ProtocolEvent {
    ProtocolEvent::ConnectionUpdate(ConnectionUpdate {
        connection: phase,
        last_disconnect: status_code.map(|code| DisconnectInfo {
            status_code: Some(code),
            message: None,
        }),
        qr: qr.map(str::to_string),
    })
}

pub struct FakeConnector {
    registered: HashSet<String>,
    opened: mpsc::UnboundedSender<FakeHandle>,
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn open(&self, request: SessionRequest) -> Result<OpenedSession, ProtocolError> {
        let session = Arc::new(FakeSession::new(self.registered.clone()));
        let (events, receiver) = mpsc::channel(64);
        let _ = self.opened.send(FakeHandle {
            instance_key: request.instance_key,
            session: Arc::clone(&session),
            events,
        });
        Ok(OpenedSession {
            session,
            events: receiver,
        })
    }
}

/// Renders QR payloads as plain strings.
pub struct TextQrRenderer;

impl QrRenderer for TextQrRenderer {
    fn render(&self, payload: &str) -> Result<String, NotifyError> {
        Ok(format!("qr:{payload}"))
    }
}

/// A registry over the fake protocol with its data dir in a temp directory.
pub struct Harness {
    pub registry: Registry,
    pub opened: mpsc::UnboundedReceiver<FakeHandle>,
    pub data_dir: TempDir,
}

pub struct HarnessBuilder {
    config: GatewayConfig,
    registered: HashSet<String>,
    data_dir: TempDir,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        let data_dir = TempDir::new().expect("temp dir");
        let mut config = GatewayConfig::default();
        config.data_dir = data_dir.path().to_path_buf();
        config.reconnect.initial_ms = 10;
        config.reconnect.max_ms = 50;
        Self {
            config,
            registered: HashSet::new(),
            data_dir,
        }
    }

    /// Phone numbers (bare) that the fake directory reports as registered.
    pub fn registered(mut self, numbers: &[&str]) -> Self {
        self.registered = numbers
            .iter()
            .map(|n| format!("{n}@s.whatsapp.net"))
            .collect();
        self
    }

    pub fn configure(mut self, f: impl FnOnce(&mut GatewayConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> Harness {
        let (tx, opened) = mpsc::unbounded_channel();
        let connector = Arc::new(FakeConnector {
            registered: self.registered,
            opened: tx,
        });
        let deps = InstanceDeps::new(self.config, connector, Arc::new(TextQrRenderer), None)
            .expect("deps should build");
        Harness {
            registry: Registry::new(deps),
            opened,
            data_dir: self.data_dir,
        }
    }
}

impl Harness {
    /// Waits for the next session the connector opens.
    pub async fn next_session(&mut self) -> FakeHandle {
        tokio::time::timeout(Duration::from_secs(5), self.opened.recv())
            .await
            .expect("timed out waiting for a session")
            .expect("connector dropped")
    }

    /// Creates an instance and waits for its session to open.
    pub async fn connected(&mut self, key: &str) -> (Instance, FakeHandle) {
        let instance = self.registry.create(Some(key.to_string()), false).await;
        let handle = self.next_session().await;
        (instance, handle)
    }

    /// Creates an instance whose session reached `open`.
    pub async fn logged_in(&mut self, key: &str) -> (Instance, FakeHandle) {
        let (instance, handle) = self.connected(key).await;
        handle.open().await;
        let watched = instance.clone();
        eventually(move || {
            let watched = watched.clone();
            async move { watched.user().await.is_some() }
        })
        .await;
        (instance, handle)
    }
}

/// Polls `check` until it holds or a generous deadline passes.
pub async fn eventually<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Puts a group chat into the instance's cache.
pub async fn seed_group(instance: &Instance, handle: &FakeHandle, group_id: &str) {
    handle
        .emit(ProtocolEvent::ChatsUpsert(vec![record(
            json!({ "id": group_id, "subject": "Team" }),
        )]))
        .await;
    let watched = instance.clone();
    let group_id = group_id.to_string();
    eventually(move || {
        let watched = watched.clone();
        let group_id = group_id.clone();
        async move { watched.chats().await.iter().any(|c| c.id == group_id) }
    })
    .await;
}
