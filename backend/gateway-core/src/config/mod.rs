pub mod env;
pub mod webhook;

pub use webhook::WebhookConfig;

use crate::config::env::{EnvSource, process_env, try_load_dotenv};
use crate::error::config::ConfigError;

use common::{ErrorLocation, RedactedSecret};

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;
use url::Url;

const DEFAULT_DATA_DIR: &str = "./instances_data";
const DEFAULT_BROWSER_CLIENT: &str = "Gateway";
const DEFAULT_BROWSER_NAME: &str = "Chrome";
const DEFAULT_QR_LIMIT: u32 = 5;
const DEFAULT_RETRY_CACHE_CAPACITY: usize = 1024;
const DEFAULT_GROUP_UPDATE_DELAY_MS: u64 = 1500;
const DEFAULT_WEBHOOK_QUEUE: usize = 256;
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECONNECT_INITIAL_MS: u64 = 500;
const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
const DEFAULT_BRIDGE_CALL_TIMEOUT_SECS: u64 = 60;

// ============================================
// CONFIG STRUCTS
// ============================================

/// Primary webhook endpoint shared by every instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrimaryWebhookConfig {
    pub base_url: Option<String>,
    pub ssl_verify: bool,
    /// Global kill switch for the primary endpoint.
    pub disabled: bool,
    pub queue_capacity: usize,
    pub timeout_secs: u64,
}

impl Default for PrimaryWebhookConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            ssl_verify: true,
            disabled: false,
            queue_capacity: DEFAULT_WEBHOOK_QUEUE,
            timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
        }
    }
}

/// Push-broadcast credentials. Present only when an app id is configured.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PusherConfig {
    pub app_id: String,
    pub key: String,
    pub secret: RedactedSecret,
    pub cluster: String,
}

/// Client/name pair advertised to the protocol server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrowserIdentity {
    pub client: String,
    pub name: String,
}

impl Default for BrowserIdentity {
    fn default() -> Self {
        Self {
            client: DEFAULT_BROWSER_CLIENT.to_string(),
            name: DEFAULT_BROWSER_NAME.to_string(),
        }
    }
}

impl BrowserIdentity {
    pub fn triple(&self) -> [String; 3] {
        [
            self.client.clone(),
            self.name.clone(),
            crate::BROWSER_VERSION.to_string(),
        ]
    }
}

/// Sidecar process hosting the protocol library.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub url: Option<String>,
    pub token: Option<RedactedSecret>,
    pub call_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            call_timeout_secs: DEFAULT_BRIDGE_CALL_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub qr_limit: u32,
    pub retry_cache_capacity: usize,
    pub group_update_delay_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            qr_limit: DEFAULT_QR_LIMIT,
            retry_cache_capacity: DEFAULT_RETRY_CACHE_CAPACITY,
            group_update_delay_ms: DEFAULT_GROUP_UPDATE_DELAY_MS,
        }
    }
}

impl LimitsConfig {
    pub fn group_update_delay(&self) -> Duration {
        Duration::from_millis(self.group_update_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: DEFAULT_RECONNECT_INITIAL_MS,
            max_ms: DEFAULT_RECONNECT_MAX_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub data_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub webhook: PrimaryWebhookConfig,
    pub pusher: Option<PusherConfig>,
    pub browser: BrowserIdentity,
    pub bridge: BridgeConfig,
    pub limits: LimitsConfig,
    pub reconnect: ReconnectConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_dir: None,
            log_level: None,
            webhook: PrimaryWebhookConfig::default(),
            pusher: None,
            browser: BrowserIdentity::default(),
            bridge: BridgeConfig::default(),
            limits: LimitsConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ============================================
// IMPLEMENTATION
// ============================================

impl GatewayConfig {
    /// Builds the process configuration.
    ///
    /// Layers, later wins: defaults, the optional TOML file, then environment
    /// variables (a `.env` file is loaded first when one exists). The result
    /// is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, an
    /// environment value does not parse, or validation fails.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let env_result = try_load_dotenv();
        if !env_result.loaded {
            debug!("No .env file loaded");
        }

        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&process_env())?;
        config.validate()?;

        info!(
            "Gateway config loaded: data_dir={}, primary_webhook={}, push_broadcast={}",
            config.data_dir.display(),
            config.webhook.base_url.as_deref().unwrap_or("<none>"),
            config.pusher.is_some()
        );
        Ok(config)
    }

    /// Reads a TOML file; absent sections keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Overlays environment variables onto the current values.
    pub(crate) fn apply_env<F>(&mut self, env: &EnvSource<F>) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = env.string("GATEWAY_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env.string("GATEWAY_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = env.string("GATEWAY_LOG_LEVEL") {
            self.log_level = Some(level);
        }

        if let Some(url) = env.string("WEBOOK_BASE_URL") {
            self.webhook.base_url = Some(url);
        }
        if let Some(verify) = env.flag("WEBOOK_SSL_VERIFY") {
            self.webhook.ssl_verify = verify;
        }
        if let Some(disabled) = env.flag("DISABLE_WEBHOOK") {
            self.webhook.disabled = disabled;
        }
        if let Some(capacity) = env.parse("GATEWAY_WEBHOOK_QUEUE")? {
            self.webhook.queue_capacity = capacity;
        }

        // Push broadcast counts as configured only when an app id is present.
        if let Some(app_id) = env.string("PUSHER_APP_ID") {
            let mut pusher = self.pusher.take().unwrap_or_default();
            pusher.app_id = app_id;
            if let Some(key) = env.string("PUSHER_KEY") {
                pusher.key = key;
            }
            if let Some(secret) = env.string("PUSHER_SECRET") {
                pusher.secret = RedactedSecret::new(secret);
            }
            if let Some(cluster) = env.string("PUSHER_CLUSTER") {
                pusher.cluster = cluster;
            }
            self.pusher = Some(pusher);
        }

        if let Some(client) = env.string("BROWSER_CLIENT") {
            self.browser.client = client;
        }
        if let Some(name) = env.string("BROWSER_NAME") {
            self.browser.name = name;
        }

        if let Some(url) = env.string("GATEWAY_BRIDGE_URL") {
            self.bridge.url = Some(url);
        }
        if let Some(token) = env.string("GATEWAY_BRIDGE_TOKEN") {
            self.bridge.token = Some(RedactedSecret::new(token));
        }

        if let Some(capacity) = env.parse("GATEWAY_RETRY_CACHE_CAPACITY")? {
            self.limits.retry_cache_capacity = capacity;
        }
        if let Some(delay) = env.parse("GATEWAY_GROUP_UPDATE_DELAY_MS")? {
            self.limits.group_update_delay_ms = delay;
        }
        if let Some(limit) = env.parse("GATEWAY_QR_LIMIT")? {
            self.limits.qr_limit = limit;
        }
        if let Some(initial) = env.parse("GATEWAY_RECONNECT_INITIAL_MS")? {
            self.reconnect.initial_ms = initial;
        }
        if let Some(max) = env.parse("GATEWAY_RECONNECT_MAX_MS")? {
            self.reconnect.max_ms = max;
        }

        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref url) = self.webhook.base_url {
            validate_http_url("webhook base_url", url)?;
        }

        if self.limits.qr_limit == 0 {
            return Err(validation_error("qr_limit must be at least 1"));
        }
        if self.limits.retry_cache_capacity == 0 {
            return Err(validation_error("retry_cache_capacity must be at least 1"));
        }
        if self.webhook.queue_capacity == 0 {
            return Err(validation_error("webhook queue_capacity must be at least 1"));
        }
        if self.reconnect.initial_ms == 0 || self.reconnect.initial_ms > self.reconnect.max_ms {
            return Err(validation_error(format!(
                "Invalid reconnect window: initial {}ms, max {}ms",
                self.reconnect.initial_ms, self.reconnect.max_ms
            )));
        }

        if let Some(ref pusher) = self.pusher
            && !pusher.app_id.is_empty()
        {
            if pusher.key.is_empty() || pusher.secret.is_empty() || pusher.cluster.is_empty() {
                return Err(validation_error(
                    "PUSHER_KEY, PUSHER_SECRET and PUSHER_CLUSTER are required with PUSHER_APP_ID",
                ));
            }
        }

        if let Some(ref url) = self.bridge.url {
            let parsed = Url::parse(url).map_err(|e| {
                validation_error(format!("Invalid bridge url {url}: {e}"))
            })?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(validation_error(format!(
                    "Bridge url must be ws:// or wss://, got {url}"
                )));
            }
        }

        Ok(())
    }

    /// Push-broadcast credentials, if an app id is set.
    pub fn pusher(&self) -> Option<&PusherConfig> {
        self.pusher.as_ref().filter(|p| !p.app_id.is_empty())
    }

    /// Per-instance webhook config directory.
    pub fn webhook_dir(&self) -> PathBuf {
        self.data_dir.join(crate::WEBHOOK_CONFIG_DIR)
    }

    /// Credentials directory owned by the protocol library for `key`.
    pub fn session_dir(&self, key: &str) -> PathBuf {
        self.data_dir.join(key)
    }
}

#[track_caller]
fn validation_error(reason: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: reason.into(),
    }
}

#[track_caller]
fn validate_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let parsed =
        Url::parse(url).map_err(|e| validation_error(format!("Invalid {field} {url}: {e}")))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(validation_error(format!(
            "Invalid {field} format: {url}"
        )));
    }
    Ok(())
}
