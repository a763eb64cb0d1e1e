use crate::config::PusherConfig;
use crate::error::notify::NotifyError;

use common::{ErrorLocation, RedactedSecret};

use std::panic::Location;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use const_format::concatcp;
use hmac::{Hmac, Mac};
use log::trace;
use reqwest::Client;
use serde_json::{Value, json};
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const PUSHER_API_SCHEME: &str = "https://";
const PUSHER_API_HOST_PREFIX: &str = concatcp!(PUSHER_API_SCHEME, "api-");
const PUSHER_API_HOST_SUFFIX: &str = ".pusher.com";
const PUSHER_AUTH_VERSION: &str = "1.0";

/// Push-notification channel keyed by instance.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, channel: &str, event: &str, payload: &Value)
    -> Result<(), NotifyError>;
}

/// Pusher Channels HTTP API publisher.
#[derive(Debug, Clone)]
pub struct PusherBroadcaster {
    app_id: String,
    key: String,
    secret: RedactedSecret,
    base_url: Url,
    http: Client,
}

impl PusherBroadcaster {
    pub fn new(config: &PusherConfig, http: Client) -> Result<Self, NotifyError> {
        let base_url = Url::parse(&format!(
            "{PUSHER_API_HOST_PREFIX}{}{PUSHER_API_HOST_SUFFIX}",
            config.cluster
        ))?;
        Ok(Self::with_base_url(config, base_url, http))
    }

    /// Publishes to an arbitrary host (self-hosted Pusher-compatible servers).
    pub fn with_base_url(config: &PusherConfig, base_url: Url, http: Client) -> Self {
        Self {
            app_id: config.app_id.clone(),
            key: config.key.clone(),
            secret: config.secret.clone(),
            base_url,
            http,
        }
    }

    fn events_path(&self) -> String {
        format!("/apps/{}/events", self.app_id)
    }
}

/// `auth_signature` for a Pusher REST request: hex HMAC-SHA256 over
/// `"POST\n<path>\n<query>"` where the query is sorted by key.
pub(crate) fn sign_request(secret: &str, path: &str, query: &str) -> Result<String, NotifyError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| NotifyError::Signature {
            message: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;
    mac.update(format!("POST\n{path}\n{query}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Sorted auth query without the signature.
pub(crate) fn auth_query(key: &str, timestamp: u64, body: &str) -> String {
    let body_md5 = format!("{:x}", md5::compute(body.as_bytes()));
    format!(
        "auth_key={key}&auth_timestamp={timestamp}&auth_version={PUSHER_AUTH_VERSION}&body_md5={body_md5}"
    )
}

#[async_trait]
impl Broadcaster for PusherBroadcaster {
    async fn broadcast(
        &self,
        channel: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), NotifyError> {
        let body = json!({
            "name": event,
            "channels": [channel],
            "data": payload.to_string(),
        })
        .to_string();

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let path = self.events_path();
        let query = auth_query(&self.key, timestamp, &body);
        let signature = sign_request(self.secret.expose(), &path, &query)?;

        let mut url = self.base_url.join(&path)?;
        url.set_query(Some(&format!("{query}&auth_signature={signature}")));

        trace!("Broadcasting {} on {}", event, channel);

        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::rejected(status.as_u16()));
        }
        Ok(())
    }
}
