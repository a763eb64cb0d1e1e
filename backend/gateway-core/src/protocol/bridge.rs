//! WebSocket bridge to an out-of-process protocol library.
//!
//! The library runs in a sidecar that speaks JSON text frames. Each instance
//! gets its own socket:
//!
//! 1. **First frame MUST be** `auth` with the shared token, the instance key,
//!    the credentials directory and the browser triple
//! 2. Sidecar answers `auth_result`; on failure the socket is dropped
//! 3. RPC calls are `call` frames correlated with `result` frames by id
//! 4. Library events arrive as `event` frames
//! 5. Resend lookups arrive as `get_message` and are answered with `message`
//!
//! When the socket goes away a synthetic `connection.update` close with
//! status 428 is emitted so the lifecycle manager reconnects.

use crate::config::BridgeConfig;
use crate::error::protocol::ProtocolError;
use crate::protocol::{
    ConnectionPhase, ConnectionUpdate, DisconnectInfo, DisconnectReason, GroupAction,
    GroupMetadata, GroupSetting, MediaDescriptor, MediaKind, MessageSource, MessageUpsertKind,
    OpenedSession, OutgoingContent, ProtocolEvent, ProtocolSession, Record, RegistrationResult,
    SessionConnector, SessionRequest, SessionUser,
};

use common::{ErrorLocation, RedactedSecret};

use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::spawn as TokioSpawn;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;
use uuid::Uuid;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;
type PendingCalls = Mutex<HashMap<String, oneshot::Sender<Result<Value, String>>>>;

// ============================================
// WIRE FRAMES
// ============================================

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutboundFrame<'a> {
    Auth {
        token: &'a str,
        instance_key: &'a str,
        auth_dir: String,
        browser: [String; 3],
    },
    Call {
        id: &'a str,
        method: &'a str,
        params: Value,
    },
    Message {
        id: &'a str,
        message: Option<Value>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundFrame {
    AuthResult {
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Result {
        id: String,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    Event {
        name: String,
        #[serde(default)]
        data: Value,
    },
    GetMessage {
        id: String,
        #[serde(default)]
        key: Value,
    },
}

#[derive(Debug, Deserialize)]
struct MessagesUpsertPayload {
    #[serde(rename = "type")]
    kind: MessageUpsertKind,
    #[serde(default)]
    messages: Vec<Record>,
}

/// Decodes a library event. Unknown names yield `Ok(None)`.
pub(crate) fn decode_event(name: &str, data: Value) -> Result<Option<ProtocolEvent>, ProtocolError> {
    let event = match name {
        "creds.update" => ProtocolEvent::CredsUpdate,
        "chats.set" => ProtocolEvent::ChatsSet(decode(take_field(data, "chats"))?),
        "chats.upsert" => ProtocolEvent::ChatsUpsert(decode(data)?),
        "chats.update" => ProtocolEvent::ChatsUpdate(decode(data)?),
        "chats.delete" => ProtocolEvent::ChatsDelete(decode(data)?),
        "contacts.set" => ProtocolEvent::ContactsSet(decode(take_field(data, "contacts"))?),
        "contacts.upsert" => ProtocolEvent::ContactsUpsert(decode(data)?),
        "contacts.update" => ProtocolEvent::ContactsUpdate(decode(data)?),
        "call" => ProtocolEvent::Call(decode(data)?),
        "messages.upsert" => {
            let payload: MessagesUpsertPayload = decode(data)?;
            ProtocolEvent::MessagesUpsert {
                kind: payload.kind,
                messages: payload.messages,
            }
        }
        "connection.update" => ProtocolEvent::ConnectionUpdate(decode(data)?),
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn take_field(mut data: Value, field: &str) -> Value {
    data.get_mut(field)
        .map(Value::take)
        .unwrap_or_else(|| Value::Array(Vec::new()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ProtocolError> {
    Ok(serde_json::from_value(value)?)
}

// ============================================
// CONNECTOR
// ============================================

/// Opens one sidecar socket per instance.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    url: Url,
    token: RedactedSecret,
    call_timeout: Duration,
}

impl BridgeConnector {
    #[track_caller]
    pub fn new(
        url: &str,
        token: Option<RedactedSecret>,
        call_timeout: Duration,
    ) -> Result<Self, ProtocolError> {
        let url = Url::parse(url).map_err(|e| ProtocolError::Connect {
            message: format!("Invalid bridge url {url}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        Ok(Self {
            url,
            token: token.unwrap_or_default(),
            call_timeout,
        })
    }

    #[track_caller]
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ProtocolError> {
        let Some(ref url) = config.url else {
            return Err(ProtocolError::Connect {
                message: "GATEWAY_BRIDGE_URL is not set".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        };
        Self::new(
            url,
            config.token.clone(),
            Duration::from_secs(config.call_timeout_secs),
        )
    }
}

#[async_trait]
impl SessionConnector for BridgeConnector {
    async fn open(&self, request: SessionRequest) -> Result<OpenedSession, ProtocolError> {
        let (ws_stream, _) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| ProtocolError::Connect {
                    message: format!("Failed to reach bridge at {}: {e}", self.url),
                    location: ErrorLocation::from(Location::caller()),
                })?;

        let (mut write, mut read) = ws_stream.split();

        let auth = OutboundFrame::Auth {
            token: self.token.expose(),
            instance_key: &request.instance_key,
            auth_dir: request.auth_dir.display().to_string(),
            browser: request.browser.triple(),
        };
        write.send(Message::text(serde_json::to_string(&auth)?)).await?;

        await_auth_result(&mut read).await?;
        info!("Bridge session authenticated for {}", request.instance_key);

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let shared = Arc::new(BridgeShared {
            instance_key: request.instance_key.clone(),
            pending: Mutex::new(HashMap::new()),
            user: std::sync::Mutex::new(None),
            ended: AtomicBool::new(false),
            outbound: outbound_tx,
        });

        TokioSpawn(write_loop(write, outbound_rx));
        TokioSpawn(read_loop(
            read,
            Arc::clone(&shared),
            event_tx,
            request.message_source,
        ));

        Ok(OpenedSession {
            session: Arc::new(BridgeSession {
                shared,
                call_timeout: self.call_timeout,
            }),
            events: event_rx,
        })
    }
}

async fn await_auth_result(read: &mut WsRead) -> Result<(), ProtocolError> {
    let first = timeout(HANDSHAKE_TIMEOUT, read.next())
        .await
        .map_err(|_| ProtocolError::Handshake {
            message: "Timed out waiting for auth_result".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

    match first {
        Some(Ok(Message::Text(text))) => match serde_json::from_str(text.as_str())? {
            InboundFrame::AuthResult { success: true, .. } => Ok(()),
            InboundFrame::AuthResult { error, .. } => Err(ProtocolError::Handshake {
                message: error.unwrap_or_else(|| "Authentication rejected".to_string()),
                location: ErrorLocation::from(Location::caller()),
            }),
            other => Err(ProtocolError::Handshake {
                message: format!("Expected auth_result, got {other:?}"),
                location: ErrorLocation::from(Location::caller()),
            }),
        },
        Some(Ok(other)) => Err(ProtocolError::Handshake {
            message: format!("Expected text auth_result, got {other:?}"),
            location: ErrorLocation::from(Location::caller()),
        }),
        Some(Err(e)) => Err(e.into()),
        None => Err(ProtocolError::closed()),
    }
}

// ============================================
// SOCKET TASKS
// ============================================

struct BridgeShared {
    instance_key: String,
    pending: PendingCalls,
    user: std::sync::Mutex<Option<SessionUser>>,
    ended: AtomicBool,
    outbound: mpsc::Sender<Message>,
}

impl BridgeShared {
    async fn send(&self, frame: &OutboundFrame<'_>) -> Result<(), ProtocolError> {
        let text = serde_json::to_string(frame)?;
        self.outbound
            .send(Message::text(text))
            .await
            .map_err(|_| ProtocolError::closed())
    }

    fn set_user(&self, user: Option<SessionUser>) {
        if let Ok(mut slot) = self.user.lock() {
            *slot = user;
        }
    }

    /// Tracks the logged-in account from events that carry it.
    fn observe_user(&self, name: &str, data: &Value) {
        let field = match name {
            "connection.update" => "user",
            "creds.update" => "me",
            _ => return,
        };
        if let Some(raw) = data.get(field)
            && let Ok(user) = serde_json::from_value::<SessionUser>(raw.clone())
        {
            self.set_user(Some(user));
        }
    }

    async fn fail_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err("bridge connection closed".to_string()));
        }
    }
}

async fn write_loop(mut write: WsWrite, mut outbound: mpsc::Receiver<Message>) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = write.send(message).await {
            warn!("Bridge write failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = write.close().await;
}

async fn read_loop(
    mut read: WsRead,
    shared: Arc<BridgeShared>,
    events: mpsc::Sender<ProtocolEvent>,
    source: Arc<dyn MessageSource>,
) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<InboundFrame>(text.as_str()) {
                Ok(frame) => handle_frame(frame, &shared, &events, source.as_ref()).await,
                Err(e) => warn!("Undecodable bridge frame for {}: {}", shared.instance_key, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                error!("Bridge read failed for {}: {}", shared.instance_key, e);
                break;
            }
        }
    }

    shared.fail_pending().await;

    if !shared.ended.load(Ordering::SeqCst) {
        info!("Bridge socket for {} closed", shared.instance_key);
        let closed = ProtocolEvent::ConnectionUpdate(ConnectionUpdate {
            connection: Some(ConnectionPhase::Close),
            last_disconnect: Some(DisconnectInfo {
                status_code: Some(DisconnectReason::ConnectionClosed.code()),
                message: Some("bridge connection closed".to_string()),
            }),
            qr: None,
        });
        let _ = events.send(closed).await;
    }
}

async fn handle_frame(
    frame: InboundFrame,
    shared: &BridgeShared,
    events: &mpsc::Sender<ProtocolEvent>,
    source: &dyn MessageSource,
) {
    match frame {
        InboundFrame::Result { id, result, error } => {
            let Some(tx) = shared.pending.lock().await.remove(&id) else {
                debug!("Result for unknown call {}", id);
                return;
            };
            let outcome = match error {
                Some(message) => Err(message),
                None => Ok(result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(outcome);
        }
        InboundFrame::Event { name, data } => {
            shared.observe_user(&name, &data);
            match decode_event(&name, data) {
                Ok(Some(event)) => {
                    if events.send(event).await.is_err() {
                        debug!("Event receiver for {} dropped", shared.instance_key);
                    }
                }
                Ok(None) => debug!("Skipping unknown bridge event {}", name),
                Err(e) => warn!("Bad {} payload for {}: {}", name, shared.instance_key, e),
            }
        }
        InboundFrame::GetMessage { id, key } => {
            let message = key
                .get("id")
                .and_then(Value::as_str)
                .and_then(|message_id| source.get_message(message_id));
            let reply = OutboundFrame::Message { id: &id, message };
            if let Err(e) = shared.send(&reply).await {
                warn!("Failed to answer resend lookup {}: {}", id, e);
            }
        }
        InboundFrame::AuthResult { .. } => {
            warn!("Unexpected auth_result after handshake for {}", shared.instance_key);
        }
    }
}

// ============================================
// SESSION
// ============================================

struct BridgeSession {
    shared: Arc<BridgeShared>,
    call_timeout: Duration,
}

impl BridgeSession {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ProtocolError> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(id.clone(), tx);

        let frame = OutboundFrame::Call {
            id: &id,
            method,
            params,
        };
        if let Err(e) = self.shared.send(&frame).await {
            self.shared.pending.lock().await.remove(&id);
            return Err(e);
        }

        match timeout(self.call_timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(ProtocolError::rpc(method, message)),
            Ok(Err(_)) => Err(ProtocolError::closed()),
            Err(_) => {
                self.shared.pending.lock().await.remove(&id);
                Err(ProtocolError::Timeout {
                    method: method.to_string(),
                    timeout_secs: self.call_timeout.as_secs(),
                    location: ErrorLocation::from(Location::caller()),
                })
            }
        }
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ProtocolError> {
        decode(self.call(method, params).await?)
    }
}

#[async_trait]
impl ProtocolSession for BridgeSession {
    fn user(&self) -> Option<SessionUser> {
        self.shared.user.lock().ok().and_then(|user| user.clone())
    }

    async fn save_credentials(&self) -> Result<(), ProtocolError> {
        self.call("saveCreds", json!({})).await.map(|_| ())
    }

    async fn send_message(
        &self,
        jid: &str,
        content: &OutgoingContent,
    ) -> Result<Record, ProtocolError> {
        self.call_as(
            "sendMessage",
            json!({ "jid": jid, "content": content.to_wire() }),
        )
        .await
    }

    async fn on_whatsapp(&self, jid: &str) -> Result<Vec<RegistrationResult>, ProtocolError> {
        self.call_as("onWhatsApp", json!({ "jids": [jid] })).await
    }

    async fn group_create(
        &self,
        subject: &str,
        participants: &[String],
    ) -> Result<GroupMetadata, ProtocolError> {
        self.call_as(
            "groupCreate",
            json!({ "subject": subject, "participants": participants }),
        )
        .await
    }

    async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata, ProtocolError> {
        self.call_as("groupMetadata", json!({ "groupId": group_id }))
            .await
    }

    async fn group_invite_code(&self, group_id: &str) -> Result<String, ProtocolError> {
        self.call_as("groupInviteCode", json!({ "groupId": group_id }))
            .await
    }

    async fn group_setting_update(
        &self,
        group_id: &str,
        setting: GroupSetting,
    ) -> Result<(), ProtocolError> {
        self.call(
            "groupSettingUpdate",
            json!({ "groupId": group_id, "setting": setting }),
        )
        .await
        .map(|_| ())
    }

    async fn group_participants_update(
        &self,
        group_id: &str,
        participants: &[String],
        action: GroupAction,
    ) -> Result<Value, ProtocolError> {
        self.call(
            "groupParticipantsUpdate",
            json!({ "groupId": group_id, "participants": participants, "action": action }),
        )
        .await
    }

    async fn group_leave(&self, group_id: &str) -> Result<(), ProtocolError> {
        self.call("groupLeave", json!({ "groupId": group_id }))
            .await
            .map(|_| ())
    }

    async fn download_media(
        &self,
        descriptor: &MediaDescriptor,
        media_type: MediaKind,
    ) -> Result<Vec<u8>, ProtocolError> {
        let encoded: String = self
            .call_as(
                "downloadMedia",
                json!({ "message": descriptor, "type": media_type }),
            )
            .await?;

        STANDARD
            .decode(encoded)
            .map_err(|e| ProtocolError::decode(format!("media payload is not base64: {e}")))
    }

    async fn logout(&self) -> Result<(), ProtocolError> {
        self.call("logout", json!({})).await?;
        self.shared.set_user(None);
        Ok(())
    }

    async fn end(&self, reason: &str, status_code: u16) {
        if self.shared.ended.swap(true, Ordering::SeqCst) {
            return;
        }

        let id = Uuid::new_v4().to_string();
        let frame = OutboundFrame::Call {
            id: &id,
            method: "end",
            params: json!({ "reason": reason, "statusCode": status_code }),
        };
        if let Err(e) = self.shared.send(&frame).await {
            debug!("Bridge end for {} not delivered: {}", self.shared.instance_key, e);
        }
        let _ = self.shared.outbound.send(Message::Close(None)).await;
        info!(
            "Bridge session for {} ended: {} ({})",
            self.shared.instance_key, reason, status_code
        );
    }
}
