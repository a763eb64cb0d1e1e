use crate::error::instance::InstanceError;
use crate::instance::{ConnectionStatus, Instance};
use crate::notify::{CONNECTION_UPDATE_EVENT, QRCODE_UPDATE_EVENT};
use crate::protocol::{
    ConnectionPhase, ConnectionUpdate, DisconnectReason, ProtocolEvent, SessionRequest,
};
use crate::QR_LIMIT_REASON;

use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use backoff::backoff::Backoff;
use log::{debug, error, info, warn};
use serde_json::json;
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc;

impl Instance {
    /// Opens a fresh protocol session and starts consuming its events.
    ///
    /// Any previous session's events are discarded from here on.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Protocol`] if the connector cannot open a
    /// session. The instance is left `Disconnected`.
    pub async fn connect(&self) -> Result<(), InstanceError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.write().await;
            state.status = ConnectionStatus::Connecting;
            state.qr_exhausted = false;
        }

        let auth_dir = self.deps.config.session_dir(&self.key);
        if let Err(e) = tokio::fs::create_dir_all(&auth_dir).await {
            warn!(
                "Could not create credentials dir {}: {}",
                auth_dir.display(),
                e
            );
        }

        let request = SessionRequest {
            instance_key: self.key.clone(),
            auth_dir,
            browser: self.deps.config.browser.clone(),
            message_source: Arc::new(self.retry.clone()),
        };

        let opened = match self.deps.connector.open(request).await {
            Ok(opened) => opened,
            Err(e) => {
                error!("Failed to open session for {}: {}", self.key, e);
                self.set_status(ConnectionStatus::Disconnected).await;
                return Err(e.into());
            }
        };

        self.webhook.reload().await;

        if !self.is_current(generation) || self.is_retired() {
            debug!("Session for {} superseded while opening", self.key);
            opened
                .session
                .end("superseded", DisconnectReason::ConnectionClosed.code())
                .await;
            return Ok(());
        }

        let previous = self.state.write().await.session.replace(opened.session);
        if let Some(previous) = previous {
            previous
                .end("reconnect", DisconnectReason::ConnectionClosed.code())
                .await;
        }
        TokioSpawn(self.clone().run_events(generation, opened.events));

        info!("Instance {} connecting (generation {})", self.key, generation);
        Ok(())
    }

    /// Connects in the background, falling back to the reconnect loop.
    pub(crate) fn spawn_connect(&self) {
        let this = self.clone();
        TokioSpawn(async move {
            if let Err(e) = this.connect().await {
                warn!("Initial connect for {} failed: {}", this.key, e);
                this.reconnect().await;
            }
        });
    }

    fn spawn_reconnect(&self) {
        let this = self.clone();
        TokioSpawn(async move { this.reconnect().await });
    }

    /// Retries `connect` with exponential backoff until it succeeds or the
    /// instance is retired.
    async fn reconnect(&self) {
        loop {
            if self.is_retired() {
                return;
            }

            let delay = {
                let mut backoff = self.backoff.lock().await;
                backoff.next_backoff().unwrap_or(backoff.max_interval)
            };
            self.set_status(ConnectionStatus::Reconnecting).await;
            info!("Reconnecting {} in {:?}", self.key, delay);
            tokio::time::sleep(delay).await;

            if self.is_retired() {
                return;
            }
            match self.connect().await {
                Ok(()) => return,
                Err(e) => warn!("Reconnect of {} failed: {}", self.key, e),
            }
        }
    }

    async fn run_events(self, generation: u64, mut events: mpsc::Receiver<ProtocolEvent>) {
        while let Some(event) = events.recv().await {
            if !self.is_current(generation) {
                debug!(
                    "Dropping {} from superseded session of {}",
                    event.name(),
                    self.key
                );
                break;
            }
            self.handle_event(event).await;
        }
        debug!("Event stream of {} (generation {}) ended", self.key, generation);
    }

    pub(crate) async fn on_connection_update(&self, update: ConnectionUpdate) {
        {
            let state = self.state.read().await;
            // Both are terminal until the instance is reset.
            if state.qr_exhausted || state.status == ConnectionStatus::LoggedOut {
                return;
            }
        }

        let status_code = update.status_code();
        match update.connection {
            Some(ConnectionPhase::Connecting) => {
                self.set_status(ConnectionStatus::Connecting).await;
                return;
            }
            Some(phase) => self.announce_connection(phase, status_code).await,
            None => {}
        }

        if update.connection == Some(ConnectionPhase::Close) {
            if status_code == Some(DisconnectReason::LoggedOut.code()) {
                self.on_logged_out().await;
            } else if !self.is_retired() {
                self.spawn_reconnect();
            }
        }

        if let Some(ref qr) = update.qr {
            self.on_qr(qr).await;
        }
    }

    async fn announce_connection(&self, phase: ConnectionPhase, status_code: Option<u16>) {
        let user = {
            let mut state = self.state.write().await;
            match phase {
                ConnectionPhase::Open => {
                    state.status = ConnectionStatus::Open;
                    if let Some(user) = state.session.as_ref().and_then(|s| s.user()) {
                        state.user = Some(user);
                    }
                    state.user.clone()
                }
                _ => {
                    state.status = ConnectionStatus::Closing;
                    None
                }
            }
        };

        if phase == ConnectionPhase::Open {
            self.backoff.lock().await.reset();
        }
        info!(
            "Instance {} connection {} (reason {:?})",
            self.key,
            phase.as_str(),
            status_code
        );

        self.webhook.deliver(json!({
            "instance_key": self.key,
            "connection_state": phase.as_str(),
            "messageType": "connection_update",
            "closeReason": status_code,
        }));

        if self.deps.broadcaster.is_some() {
            self.webhook.broadcast(
                CONNECTION_UPDATE_EVENT,
                json!({
                    "connectionState": phase.as_str(),
                    "userData": user,
                }),
            );
        }
    }

    /// Ends the session for good. Later events of this session, including
    /// the transport's own close, are dropped.
    async fn on_logged_out(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let session = {
            let mut state = self.state.write().await;
            state.user = None;
            state.status = ConnectionStatus::LoggedOut;
            state.session.take()
        };
        if let Some(session) = session {
            session
                .end("logged out", DisconnectReason::LoggedOut.code())
                .await;
        }
        self.remove_credentials().await;
        warn!("Instance {} logged out, credentials removed", self.key);
    }

    async fn on_qr(&self, qr: &str) {
        let limit = self.deps.config.limits.qr_limit;
        {
            let mut state = self.state.write().await;
            if state.qr_count >= limit {
                state.qr_exhausted = true;
                state.status = ConnectionStatus::QrLimitReached;
                let session = state.session.clone();
                drop(state);

                warn!("Instance {} reached the QR limit of {}", self.key, limit);
                if let Some(session) = session {
                    session
                        .end(QR_LIMIT_REASON, DisconnectReason::BadSession.code())
                        .await;
                }
                return;
            }
            state.qr_count += 1;
            state.status = ConnectionStatus::AwaitingQr;
        }

        let url = match self.deps.qr_renderer.render(qr) {
            Ok(url) => url,
            Err(e) => {
                warn!("QR render for {} failed: {}", self.key, e);
                return;
            }
        };
        self.state.write().await.qr_code = Some(url.clone());

        if self.deps.broadcaster.is_some() {
            self.webhook
                .broadcast(QRCODE_UPDATE_EVENT, json!({ "qrcode": url }));
        }
        self.webhook.deliver(json!({
            "instance_key": self.key,
            "qrcode": url,
            "messageType": "qrcode_update",
        }));
    }

    /// Logs the account out of the protocol server. Failures are logged.
    pub async fn logout(&self) {
        let session = self.state.read().await.session.clone();
        let Some(session) = session else {
            debug!("Instance {} has no session to log out", self.key);
            return;
        };
        match session.logout().await {
            Ok(()) => info!("Instance {} logged out", self.key),
            Err(e) => warn!("Logout of {} failed: {}", self.key, e),
        }
    }

    /// Stops the instance for good: later events and reconnects are ignored
    /// and the current session is ended.
    pub(crate) async fn retire(&self, reason: &str) {
        self.retired.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);

        let session = {
            let mut state = self.state.write().await;
            state.status = ConnectionStatus::Disconnected;
            state.session.take()
        };
        if let Some(session) = session {
            session
                .end(reason, DisconnectReason::ConnectionClosed.code())
                .await;
        }
        info!("Instance {} retired: {}", self.key, reason);
    }

    pub(crate) async fn remove_credentials(&self) {
        let dir = self.deps.config.session_dir(&self.key);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => info!("Removed credentials at {}", dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
        }
    }
}
