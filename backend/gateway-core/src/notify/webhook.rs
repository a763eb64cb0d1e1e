use crate::config::webhook::WebhookConfigUpdate;
use crate::config::{PrimaryWebhookConfig, WebhookConfig};
use crate::error::notify::NotifyError;
use crate::notify::broadcast::Broadcaster;
use crate::notify::NotifyJob;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Client;
use serde_json::Value;
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use url::Url;

/// HTTP clients shared by every instance's dispatcher.
#[derive(Debug, Clone)]
pub struct WebhookClients {
    primary: Client,
    secondary: Client,
    primary_url: Option<Url>,
    globally_disabled: bool,
    queue_capacity: usize,
}

impl WebhookClients {
    pub fn new(config: &PrimaryWebhookConfig) -> Result<Self, NotifyError> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let mut primary = Client::builder().timeout(timeout);
        if !config.ssl_verify {
            primary = primary.danger_accept_invalid_certs(true);
        }

        let primary_url = config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()?;

        Ok(Self {
            primary: primary.build()?,
            secondary: Client::builder().timeout(timeout).build()?,
            primary_url,
            globally_disabled: config.disabled,
            queue_capacity: config.queue_capacity.max(1),
        })
    }
}

#[derive(Debug)]
struct SecondaryTarget {
    config: WebhookConfig,
    url: Option<Url>,
}

impl SecondaryTarget {
    fn new(config: WebhookConfig) -> Self {
        let url = parse_secondary(&config.url);
        Self { config, url }
    }
}

fn parse_secondary(raw: &str) -> Option<Url> {
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("Secondary webhook url {raw:?} is invalid, deliveries skipped: {e}");
            None
        }
    }
}

/// Per-instance webhook relay.
///
/// `deliver` and `broadcast` only enqueue. The worker posts each webhook to
/// the secondary endpoint (when configured and enabled) and to the primary
/// endpoint (unless disabled globally or for this instance), concurrently and
/// independently. Failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    instance_key: String,
    webhook_dir: PathBuf,
    target: Arc<RwLock<SecondaryTarget>>,
    queue: mpsc::Sender<NotifyJob>,
}

impl WebhookDispatcher {
    /// Loads the persisted config and starts the worker task.
    pub fn spawn(
        instance_key: &str,
        webhook_dir: PathBuf,
        instance_disabled: bool,
        clients: WebhookClients,
        broadcaster: Option<Arc<dyn Broadcaster>>,
    ) -> Self {
        let config = WebhookConfig::load_or_default(&webhook_dir, instance_key);
        let target = Arc::new(RwLock::new(SecondaryTarget::new(config)));
        let (queue, jobs) = mpsc::channel(clients.queue_capacity);

        let worker = Worker {
            instance_key: instance_key.to_string(),
            instance_disabled,
            clients,
            broadcaster,
            target: Arc::clone(&target),
        };
        TokioSpawn(worker.run(jobs));

        Self {
            instance_key: instance_key.to_string(),
            webhook_dir,
            target,
            queue,
        }
    }

    pub fn deliver(&self, payload: Value) {
        self.enqueue(NotifyJob::Webhook(payload));
    }

    pub fn broadcast(&self, event: &'static str, payload: Value) {
        self.enqueue(NotifyJob::Broadcast { event, payload });
    }

    fn enqueue(&self, job: NotifyJob) {
        match self.queue.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                warn!(
                    "Notification queue full for {}, dropping {:?}",
                    self.instance_key,
                    job_label(&job)
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Notification worker for {} has stopped", self.instance_key);
            }
        }
    }

    pub async fn config(&self) -> WebhookConfig {
        self.target.read().await.config.clone()
    }

    /// Applies `update`, persists it and returns the resulting config.
    /// Persistence failures are logged, the in-memory change stays.
    pub async fn update_config(&self, update: WebhookConfigUpdate) -> WebhookConfig {
        let mut target = self.target.write().await;
        let mut config = target.config.clone();
        config.apply(update);
        *target = SecondaryTarget::new(config.clone());
        drop(target);

        if let Err(e) = config.save(&self.webhook_dir, &self.instance_key) {
            warn!("Failed to persist webhook config for {}: {}", self.instance_key, e);
        }
        info!(
            "Webhook config for {} updated: url={:?}, sendMessage={}",
            self.instance_key, config.url, config.send_message
        );
        config
    }

    /// Re-reads the persisted config.
    pub async fn reload(&self) {
        let config = WebhookConfig::load_or_default(&self.webhook_dir, &self.instance_key);
        *self.target.write().await = SecondaryTarget::new(config);
    }
}

fn job_label(job: &NotifyJob) -> &str {
    match job {
        NotifyJob::Webhook(payload) => payload
            .get("messageType")
            .or_else(|| payload.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("webhook"),
        NotifyJob::Broadcast { event, .. } => *event,
    }
}

struct Worker {
    instance_key: String,
    instance_disabled: bool,
    clients: WebhookClients,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    target: Arc<RwLock<SecondaryTarget>>,
}

impl Worker {
    async fn run(self, mut jobs: mpsc::Receiver<NotifyJob>) {
        while let Some(job) = jobs.recv().await {
            match job {
                NotifyJob::Webhook(payload) => self.post_webhooks(&payload).await,
                NotifyJob::Broadcast { event, payload } => {
                    let Some(ref broadcaster) = self.broadcaster else {
                        continue;
                    };
                    if let Err(e) = broadcaster
                        .broadcast(&self.instance_key, event, &payload)
                        .await
                    {
                        warn!(
                            "Broadcast {} for {} failed ({}): {}",
                            event,
                            self.instance_key,
                            e.category(),
                            e
                        );
                    }
                }
            }
        }
        debug!("Notification worker for {} stopped", self.instance_key);
    }

    async fn post_webhooks(&self, payload: &Value) {
        let secondary = {
            let target = self.target.read().await;
            if target.config.is_active() {
                target.url.clone()
            } else {
                None
            }
        };
        let primary = if self.clients.globally_disabled || self.instance_disabled {
            None
        } else {
            self.clients.primary_url.clone()
        };

        let to_secondary = async {
            if let Some(url) = secondary
                && let Err(e) = post_json(&self.clients.secondary, url, payload).await
            {
                warn!(
                    "Secondary webhook for {} failed ({}): {}",
                    self.instance_key,
                    e.category(),
                    e
                );
            }
        };
        let to_primary = async {
            if let Some(url) = primary
                && let Err(e) = post_json(&self.clients.primary, url, payload).await
            {
                warn!(
                    "Primary webhook for {} failed ({}): {}",
                    self.instance_key,
                    e.category(),
                    e
                );
            }
        };

        tokio::join!(to_secondary, to_primary);
    }
}

async fn post_json(client: &Client, url: Url, payload: &Value) -> Result<(), NotifyError> {
    let response = client.post(url).json(payload).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(NotifyError::rejected(status.as_u16()));
    }
    Ok(())
}
