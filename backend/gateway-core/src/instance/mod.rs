//! One messaging session and everything it owns.
//!
//! An [`Instance`] is a cheap handle (`Clone` shares state) around:
//! - the protocol session, replaced on every reconnect
//! - the [`StateCache`] fed by session events
//! - the retry cache answering resend requests
//! - the webhook dispatcher and its worker task
//!
//! Lifecycle lives in `lifecycle`, event ingestion in `events`, the command
//! facade in `messages` and `groups`.

pub mod events;
pub mod groups;
pub mod lifecycle;
pub mod messages;

pub use groups::ParticipantUpdateOutcome;
pub use messages::{
    BulkSendReport, Button, ButtonKind, ButtonMediaMessage, ButtonMessage, ContactCard,
    Coordinates, ListMessage, LocationMessage, MediaUpload, MediaUrlMessage, SendOutcome,
    VCardMessage,
};

use crate::cache::{ChatRecord, ContactRecord, StateCache};
use crate::config::GatewayConfig;
use crate::config::webhook::{WebhookConfig, WebhookConfigUpdate};
use crate::error::instance::InstanceError;
use crate::error::notify::NotifyError;
use crate::notify::{Broadcaster, WebhookClients, WebhookDispatcher};
use crate::protocol::{ProtocolSession, Record, SessionConnector, SessionUser};
use crate::qr::QrRenderer;
use crate::retry::RetryCache;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoff;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

const RECONNECT_RANDOMIZATION: f64 = 0.5;
const RECONNECT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Open,
    AwaitingQr,
    Closing,
    Reconnecting,
    LoggedOut,
    /// Terminal until the instance is reset.
    QrLimitReached,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::AwaitingQr => "awaiting_qr",
            ConnectionStatus::Closing => "closing",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::LoggedOut => "logged_out",
            ConnectionStatus::QrLimitReached => "qr_limit_reached",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub key: String,
    pub user: Option<SessionUser>,
    pub connection_state: ConnectionStatus,
}

/// Collaborators shared by every instance of a registry.
#[derive(Clone)]
pub struct InstanceDeps {
    pub config: Arc<GatewayConfig>,
    pub connector: Arc<dyn SessionConnector>,
    pub qr_renderer: Arc<dyn QrRenderer>,
    pub broadcaster: Option<Arc<dyn Broadcaster>>,
    webhook_clients: WebhookClients,
}

impl InstanceDeps {
    pub fn new(
        config: GatewayConfig,
        connector: Arc<dyn SessionConnector>,
        qr_renderer: Arc<dyn QrRenderer>,
        broadcaster: Option<Arc<dyn Broadcaster>>,
    ) -> Result<Self, NotifyError> {
        let webhook_clients = WebhookClients::new(&config.webhook)?;
        Ok(Self {
            config: Arc::new(config),
            connector,
            qr_renderer,
            broadcaster,
            webhook_clients,
        })
    }

    fn reconnect_backoff(&self) -> ExponentialBackoff {
        let initial = Duration::from_millis(self.config.reconnect.initial_ms);
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: Duration::from_millis(self.config.reconnect.max_ms),
            randomization_factor: RECONNECT_RANDOMIZATION,
            multiplier: RECONNECT_MULTIPLIER,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

struct InstanceState {
    status: ConnectionStatus,
    qr_code: Option<String>,
    qr_count: u32,
    /// Set once the QR budget is spent; connection updates are ignored after.
    qr_exhausted: bool,
    user: Option<SessionUser>,
    session: Option<Arc<dyn ProtocolSession>>,
}

impl Default for InstanceState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            qr_code: None,
            qr_count: 0,
            qr_exhausted: false,
            user: None,
            session: None,
        }
    }
}

#[derive(Clone)]
pub struct Instance {
    key: String,
    disable_webhook: bool,
    deps: InstanceDeps,
    state: Arc<RwLock<InstanceState>>,
    cache: Arc<RwLock<StateCache>>,
    retry: RetryCache,
    webhook: WebhookDispatcher,
    /// Bumped on every connect; events from older sessions are dropped.
    generation: Arc<AtomicU64>,
    retired: Arc<AtomicBool>,
    backoff: Arc<Mutex<ExponentialBackoff>>,
}

impl Instance {
    /// Builds an idle instance. Call [`Instance::connect`] to start it.
    pub fn new(key: impl Into<String>, disable_webhook: bool, deps: InstanceDeps) -> Self {
        let key = key.into();
        let webhook = WebhookDispatcher::spawn(
            &key,
            deps.config.webhook_dir(),
            disable_webhook,
            deps.webhook_clients.clone(),
            deps.broadcaster.clone(),
        );

        Self {
            retry: RetryCache::new(deps.config.limits.retry_cache_capacity),
            backoff: Arc::new(Mutex::new(deps.reconnect_backoff())),
            key,
            disable_webhook,
            deps,
            state: Arc::new(RwLock::new(InstanceState::default())),
            cache: Arc::new(RwLock::new(StateCache::new())),
            webhook,
            generation: Arc::new(AtomicU64::new(0)),
            retired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn disable_webhook(&self) -> bool {
        self.disable_webhook
    }

    pub async fn summary(&self) -> InstanceSummary {
        let state = self.state.read().await;
        InstanceSummary {
            key: self.key.clone(),
            user: state.user.clone(),
            connection_state: state.status,
        }
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status
    }

    pub async fn user(&self) -> Option<SessionUser> {
        self.state.read().await.user.clone()
    }

    pub async fn qr_count(&self) -> u32 {
        self.state.read().await.qr_count
    }

    /// Latest rendered QR challenge, for the image view.
    pub async fn qr_code(&self) -> Option<String> {
        self.state.read().await.qr_code.clone()
    }

    /// Latest QR challenge, refused once the account is logged in.
    pub async fn qr_code_base64(&self) -> Result<Option<String>, InstanceError> {
        let state = self.state.read().await;
        if state.user.is_some() {
            return Err(InstanceError::permission_denied("User is already logged in"));
        }
        Ok(state.qr_code.clone())
    }

    pub async fn require_login(&self) -> Result<SessionUser, InstanceError> {
        self.state
            .read()
            .await
            .user
            .clone()
            .ok_or_else(InstanceError::unauthenticated)
    }

    /// Current session, provided the account is logged in.
    pub(crate) async fn logged_in_session(
        &self,
    ) -> Result<Arc<dyn ProtocolSession>, InstanceError> {
        let state = self.state.read().await;
        match (&state.user, &state.session) {
            (Some(_), Some(session)) => Ok(Arc::clone(session)),
            _ => Err(InstanceError::unauthenticated()),
        }
    }

    // ============================================
    // CACHE READS
    // ============================================

    pub async fn chats(&self) -> Vec<ChatRecord> {
        self.cache.read().await.chats().to_vec()
    }

    pub async fn contacts(&self) -> Vec<ContactRecord> {
        self.cache.read().await.contacts().to_vec()
    }

    pub async fn messages_for(&self, chat_id: &str) -> Vec<Record> {
        self.cache.read().await.messages_for(chat_id)
    }

    pub async fn resolve_identity(&self, id: &str) -> String {
        self.cache.read().await.resolve(id)
    }

    // ============================================
    // WEBHOOK CONFIG
    // ============================================

    pub async fn webhook_config(&self) -> WebhookConfig {
        self.webhook.config().await
    }

    pub async fn update_webhook(&self, update: WebhookConfigUpdate) -> WebhookConfig {
        self.webhook.update_config(update).await
    }

    /// Whether both handles share the same state.
    pub(crate) fn same_instance(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub(crate) async fn set_status(&self, status: ConnectionStatus) {
        self.state.write().await.status = status;
    }
}
