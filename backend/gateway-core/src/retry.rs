//! Sent-message content kept for protocol-level resend requests.

use crate::protocol::{MessageSource, Record};

use log::trace;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde_json::Value;

/// Bounded map from message key id to the content that produced it.
///
/// Least recently used entries are evicted once `capacity` is exceeded.
/// Clones share the same entries, so the instance and its protocol session
/// can each hold one.
#[derive(Clone)]
pub struct RetryCache {
    entries: Cache<String, Value>,
}

impl RetryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity.max(1) as u64)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    pub fn insert(&self, message_id: impl Into<String>, content: Value) {
        self.entries.insert(message_id.into(), content);
    }

    pub fn get(&self, message_id: &str) -> Option<Value> {
        self.entries.get(message_id)
    }

    /// Stores `content` under the `key.id` of a sent message record.
    pub fn record(&self, sent: &Record, content: Value) {
        let Some(message_id) = sent
            .get("key")
            .and_then(|key| key.get("id"))
            .and_then(Value::as_str)
        else {
            trace!("Sent message has no key id, not caching for resend");
            return;
        };
        self.insert(message_id, content);
    }

    /// Entry count after pending evictions have been applied.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSource for RetryCache {
    fn get_message(&self, message_id: &str) -> Option<Value> {
        self.get(message_id)
    }
}
