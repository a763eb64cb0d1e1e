use crate::cache::is_from_me;
use crate::identity::IdentityResolver;
use crate::instance::Instance;
use crate::jid;
use crate::protocol::{MessageUpsertKind, ProtocolEvent, Record};

use log::{trace, warn};
use serde_json::{Map, Value, json};
use tokio::spawn as TokioSpawn;

/// Content types that carry protocol housekeeping, never user content.
const CONTROL_MESSAGE_TYPES: [&str; 2] = ["protocolMessage", "senderKeyDistributionMessage"];

impl Instance {
    pub(crate) async fn handle_event(&self, event: ProtocolEvent) {
        trace!("{} <- {}", self.key, event.name());
        match event {
            ProtocolEvent::CredsUpdate => self.on_creds_update().await,
            ProtocolEvent::ChatsSet(chats) => self.cache.write().await.load_chats(chats),
            ProtocolEvent::ChatsUpsert(chats) => self.cache.write().await.upsert_chats(chats),
            ProtocolEvent::ChatsUpdate(chats) => self.cache.write().await.update_chats(chats),
            ProtocolEvent::ChatsDelete(ids) => self.cache.write().await.delete_chats(&ids),
            ProtocolEvent::ContactsSet(contacts) => {
                self.cache.write().await.set_contacts(contacts)
            }
            ProtocolEvent::ContactsUpsert(contacts) => {
                self.cache.write().await.upsert_contacts(contacts)
            }
            ProtocolEvent::ContactsUpdate(contacts) => {
                self.cache.write().await.update_contacts(contacts)
            }
            ProtocolEvent::Call(calls) => self.on_calls(calls).await,
            ProtocolEvent::MessagesUpsert { kind, messages } => {
                self.on_messages(kind, messages).await
            }
            ProtocolEvent::ConnectionUpdate(update) => self.on_connection_update(update).await,
        }
    }

    /// Saves in the background. The save is an RPC whose reply arrives on the
    /// same transport as the events, so awaiting it here could stall on a
    /// full event queue.
    async fn on_creds_update(&self) {
        let session = self.state.read().await.session.clone();
        let Some(session) = session else {
            return;
        };
        if let Some(user) = session.user() {
            self.state.write().await.user = Some(user);
        }

        let key = self.key.clone();
        TokioSpawn(async move {
            if let Err(e) = session.save_credentials().await {
                warn!("Saving credentials for {} failed: {}", key, e);
            }
        });
    }

    async fn on_calls(&self, calls: Vec<Record>) {
        let cache = self.cache.read().await;
        for call in calls {
            let from = call.get("from").and_then(Value::as_str).unwrap_or_default();
            let remote_jid_fone = cache.resolve(from);
            self.webhook.deliver(json!({
                "type": "call",
                "data": call,
                "remoteJidFone": remote_jid_fone,
                "instance_key": self.key,
            }));
        }
    }

    async fn on_messages(&self, kind: MessageUpsertKind, messages: Vec<Record>) {
        match kind {
            MessageUpsertKind::Prepend => {
                self.cache.write().await.prepend_messages(&messages);
                return;
            }
            MessageUpsertKind::Notify => {}
            _ => return,
        }

        let own_jid = self.state.read().await.user.as_ref().map(|u| u.id.clone());

        let mut cache = self.cache.write().await;
        cache.prepend_messages(&messages);
        let cache = cache.downgrade();

        for message in &messages {
            if let Some(payload) =
                message_webhook_payload(&self.key, own_jid.as_deref(), message, cache.resolver())
            {
                self.webhook.deliver(payload);
            }
        }
    }
}

/// First key of the message content object, e.g. `conversation` or
/// `imageMessage`.
pub(crate) fn message_type(message: &Record) -> Option<&str> {
    message
        .get("message")
        .and_then(Value::as_object)
        .and_then(|content| content.keys().next())
        .map(String::as_str)
}

/// Webhook body for one inbound message, or `None` when it must not be
/// relayed (no content, self-sent, control traffic).
pub(crate) fn message_webhook_payload(
    instance_key: &str,
    own_jid: Option<&str>,
    message: &Record,
    resolver: &IdentityResolver,
) -> Option<Value> {
    if message.get("message").is_none_or(Value::is_null) {
        return None;
    }
    if is_from_me(message) {
        return None;
    }
    let message_type = message_type(message)?;
    if CONTROL_MESSAGE_TYPES.contains(&message_type) {
        return None;
    }

    let key = message.get("key");
    let remote_jid = key
        .and_then(|k| k.get("remoteJid"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let participant = key.and_then(|k| k.get("participant")).and_then(Value::as_str);
    let remote_jid_fone = resolver.resolve_sender(remote_jid, participant);
    IdentityResolver::log_outcome(remote_jid, &remote_jid_fone);

    let mut payload = Map::new();
    payload.insert("instance_key".into(), json!(instance_key));
    payload.insert("jid".into(), json!(own_jid));
    payload.insert("messageType".into(), json!(message_type));
    payload.insert("remoteJid".into(), json!(remote_jid));
    payload.insert("remoteJidFone".into(), json!(remote_jid_fone));
    for (field, value) in message {
        payload.insert(field.clone(), value.clone());
    }

    if jid::is_anonymized(remote_jid) && remote_jid_fone != remote_jid {
        payload.insert("resolvedJid".into(), json!(remote_jid_fone));
    }
    if message_type == "conversation" {
        payload.insert("text".into(), Value::Object(message.clone()));
    }

    Some(Value::Object(payload))
}
