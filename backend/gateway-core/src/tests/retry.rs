// Unit tests for the resend cache

use crate::protocol::{MessageSource, Record};
use crate::retry::RetryCache;

use serde_json::{Value, json};

fn sent(id: &str) -> Record {
    match json!({ "key": { "id": id, "remoteJid": "1@s.whatsapp.net", "fromMe": true } }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// **VALUE**: Verifies the cache never grows past its capacity.
///
/// **WHY THIS MATTERS**: The cache lives for the whole session. Unbounded growth on a
/// busy instance is a memory leak.
///
/// **BUG THIS CATCHES**: Would catch the configured capacity not reaching the cache
/// builder, or evicting the message that was just sent.
#[test]
fn given_full_cache_when_inserting_then_stays_within_capacity() {
    // GIVEN: A cache of two
    let cache = RetryCache::new(2);
    cache.insert("a", json!({ "text": "one" }));
    cache.insert("b", json!({ "text": "two" }));

    // WHEN: More entries arrive
    cache.insert("c", json!({ "text": "three" }));
    cache.insert("d", json!({ "text": "four" }));

    // THEN: Bounded, and the newest entry is still served
    assert!(cache.len() <= 2, "len was {}", cache.len());
    assert_eq!(cache.get("d"), Some(json!({ "text": "four" })));
}

#[test]
fn given_existing_id_when_inserting_then_replaces_without_growing() {
    let cache = RetryCache::new(4);
    cache.insert("a", json!(1));
    cache.insert("a", json!(2));

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("a"), Some(json!(2)));
}

/// **VALUE**: Verifies sent records are keyed by `key.id` and served to the protocol
/// through [`MessageSource`].
#[test]
fn given_sent_record_when_recorded_then_message_source_returns_content() {
    // GIVEN: A cache and a clone handed to the session
    let cache = RetryCache::new(8);
    let session_view = cache.clone();

    // WHEN: Recording a sent message
    cache.record(&sent("MSG1"), json!({ "text": "hello" }));

    // THEN: The protocol-facing lookup finds it through the shared clone
    assert_eq!(
        session_view.get_message("MSG1"),
        Some(json!({ "text": "hello" }))
    );
    assert_eq!(session_view.get_message("MSG2"), None);
    assert_eq!(cache.len(), 1);
}

#[test]
fn given_record_without_key_when_recorded_then_nothing_is_cached() {
    let cache = RetryCache::new(8);

    cache.record(&Record::new(), json!({ "text": "lost" }));

    assert!(cache.is_empty());
}
