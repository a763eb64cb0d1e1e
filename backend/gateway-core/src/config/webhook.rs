use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Secondary, per-instance webhook endpoint.
///
/// Persisted as `{"url": string, "sendMessage": bool}` in
/// `{data_dir}/webhooks/{key}.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "sendMessage")]
    pub send_message: bool,
}

/// Partial update; absent fields and an empty url keep the current value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct WebhookConfigUpdate {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "sendMessage")]
    pub send_message: Option<bool>,
}

impl WebhookConfig {
    pub fn path(webhook_dir: &Path, key: &str) -> PathBuf {
        webhook_dir.join(format!("{key}.json"))
    }

    /// Whether deliveries should go to the secondary endpoint.
    pub fn is_active(&self) -> bool {
        self.send_message && !self.url.is_empty()
    }

    pub fn apply(&mut self, update: WebhookConfigUpdate) {
        if let Some(url) = update.url.filter(|u| !u.is_empty()) {
            self.url = url;
        }
        if let Some(send_message) = update.send_message {
            self.send_message = send_message;
        }
    }

    /// Load from `{webhook_dir}/{key}.json`.
    ///
    /// # Returns
    ///
    /// Returns `Ok(WebhookConfig)` if loaded successfully or defaults if file missing.
    /// Returns `Err(ConfigError)` if file exists but is corrupted.
    pub fn load(webhook_dir: &Path, key: &str) -> Result<Self, ConfigError> {
        let path = Self::path(webhook_dir, key);

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.clone(),
            source: e,
        })?;

        serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
            location: ErrorLocation::from(Location::caller()),
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    /// Like [`WebhookConfig::load`] but falls back to defaults on any error.
    pub fn load_or_default(webhook_dir: &Path, key: &str) -> Self {
        Self::load(webhook_dir, key).unwrap_or_else(|e| {
            warn!("Webhook config for {key} unreadable, using defaults: {e}");
            Self::default()
        })
    }

    /// Save using temp file + rename.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - Directory creation fails
    /// - Serialization fails
    /// - Write or rename fails
    pub fn save(&self, webhook_dir: &Path, key: &str) -> Result<(), ConfigError> {
        std::fs::create_dir_all(webhook_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: webhook_dir.to_path_buf(),
            source: e,
        })?;

        let path = Self::path(webhook_dir, key);
        let temp_path = webhook_dir.join(format!("{key}.json.tmp"));

        let json = serde_json::to_string(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: path.clone(),
            source: e,
        })?;

        info!("Webhook config saved to {}", path.display());
        Ok(())
    }
}
