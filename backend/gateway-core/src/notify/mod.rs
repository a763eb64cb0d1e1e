//! Outbound notifications: HTTP webhooks and push broadcasts.
//!
//! Every instance owns one bounded queue drained by one worker task, so
//! notifications leave in the order they were produced and never block the
//! event loop or an API call.

pub mod broadcast;
pub mod webhook;

pub use broadcast::{Broadcaster, PusherBroadcaster};
pub use webhook::{WebhookClients, WebhookDispatcher};

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum NotifyJob {
    Webhook(Value),
    Broadcast { event: &'static str, payload: Value },
}

pub const CONNECTION_UPDATE_EVENT: &str = "connection_update";
pub const QRCODE_UPDATE_EVENT: &str = "qrcode_update";
