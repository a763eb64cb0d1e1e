// Unit tests for the per-instance state cache

use crate::cache::StateCache;
use crate::protocol::Record;

use serde_json::{Value, json};

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn message(id: &str, chat: &str, from_me: bool) -> Record {
    record(json!({
        "key": { "id": id, "remoteJid": chat, "fromMe": from_me },
        "message": { "conversation": "hi" },
    }))
}

/// **VALUE**: Verifies chat updates merge over existing fields instead of replacing.
///
/// **WHY THIS MATTERS**: Update events carry only the changed fields. Replacing the
/// record would wipe unread counts, names and everything else.
///
/// **BUG THIS CATCHES**: Would catch `update_chats` assigning the incoming record
/// wholesale.
#[test]
fn given_existing_chat_when_update_arrives_then_fields_are_merged() {
    // GIVEN: A chat {id:c1, name:Old, unread:3}
    let mut cache = StateCache::new();
    cache.load_chats(vec![record(json!({ "id": "c1", "name": "Old", "unread": 3 }))]);

    // WHEN: An update renames it
    cache.update_chats(vec![record(json!({ "id": "c1", "name": "New" }))]);

    // THEN: {id:c1, name:New, unread:3}
    let chat = cache.find_chat("c1").expect("chat should exist");
    assert_eq!(chat.fields.get("name"), Some(&json!("New")));
    assert_eq!(chat.fields.get("unread"), Some(&json!(3)));
    assert_eq!(cache.chats().len(), 1);
}

#[test]
fn given_unknown_chat_when_update_arrives_then_nothing_is_added() {
    let mut cache = StateCache::new();

    cache.update_chats(vec![record(json!({ "id": "ghost", "name": "x" }))]);

    assert!(cache.chats().is_empty());
}

/// **VALUE**: Verifies upsert never creates a second record for the same id.
#[test]
fn given_upserts_for_same_id_when_applied_then_single_merged_record() {
    let mut cache = StateCache::new();
    cache.upsert_chats(vec![record(json!({ "id": "c1", "name": "A" }))]);
    cache.upsert_chats(vec![record(json!({ "id": "c1", "archived": true }))]);

    assert_eq!(cache.chats().len(), 1);
    let chat = cache.find_chat("c1").expect("chat should exist");
    assert_eq!(chat.fields.get("name"), Some(&json!("A")));
    assert_eq!(chat.fields.get("archived"), Some(&json!(true)));
}

#[test]
fn given_records_without_id_when_loaded_then_dropped() {
    let mut cache = StateCache::new();
    cache.load_chats(vec![record(json!({ "name": "nameless" }))]);
    assert!(cache.chats().is_empty());
}

/// **VALUE**: Verifies deleting a chat also drops it from identity resolution.
///
/// **BUG THIS CATCHES**: Would catch a stale index resolving ids of deleted chats.
#[test]
fn given_indexed_chat_when_deleted_then_removed_and_unresolvable() {
    // GIVEN: A chat that maps an anonymized id
    let mut cache = StateCache::new();
    cache.load_chats(vec![
        record(json!({ "id": "10@lid", "pnJid": "5@s.whatsapp.net" })),
        record(json!({ "id": "c2" })),
    ]);
    assert_eq!(cache.resolve("10@lid"), "5@s.whatsapp.net");

    // WHEN: It is deleted
    cache.delete_chats(&["10@lid".to_string()]);

    // THEN: Gone from the list and the index
    assert_eq!(cache.chats().len(), 1);
    assert!(cache.find_chat("10@lid").is_none());
    assert_eq!(cache.resolve("10@lid"), "10@lid");
}

/// **VALUE**: Verifies deleting an unknown chat id changes nothing.
///
/// **BUG THIS CATCHES**: Would catch a "not found" position being used as an index,
/// which silently drops the last chat in the list.
#[test]
fn given_unknown_chat_id_when_deleted_then_every_chat_kept() {
    // GIVEN: Two cached chats
    let mut cache = StateCache::new();
    cache.load_chats(vec![
        record(json!({ "id": "c1" })),
        record(json!({ "id": "c2" })),
    ]);

    // WHEN: Deleting an id that is not cached
    cache.delete_chats(&["missing".to_string()]);

    // THEN: Both chats remain, in order
    let ids: Vec<&str> = cache.chats().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);
}

/// **VALUE**: Verifies `set_contacts` replaces the list rather than appending.
#[test]
fn given_contacts_when_set_twice_then_second_list_replaces_first() {
    let mut cache = StateCache::new();
    cache.set_contacts(vec![record(json!({ "id": "a" })), record(json!({ "id": "b" }))]);
    cache.set_contacts(vec![record(json!({ "id": "c" }))]);

    assert_eq!(cache.contacts().len(), 1);
    assert_eq!(cache.contacts()[0].id, "c");
}

#[test]
fn given_contact_when_updated_then_merged() {
    let mut cache = StateCache::new();
    cache.upsert_contacts(vec![record(json!({ "id": "a", "name": "Ann" }))]);
    cache.update_contacts(vec![record(json!({ "id": "a", "notify": "Annie" }))]);

    let contact = &cache.contacts()[0];
    assert_eq!(contact.fields.get("name"), Some(&json!("Ann")));
    assert_eq!(contact.fields.get("notify"), Some(&json!("Annie")));
}

/// **VALUE**: Verifies batches land at the head in batch order and inbound messages
/// are attached to their chat.
///
/// **BUG THIS CATCHES**: Would catch reversed batch order, or self-sent messages
/// being appended to the chat history.
#[test]
fn given_message_batches_when_prepended_then_newest_batch_first_in_order() {
    // GIVEN: A known chat
    let mut cache = StateCache::new();
    cache.load_chats(vec![record(json!({ "id": "1@s.whatsapp.net" }))]);

    // WHEN: Two batches arrive
    cache.prepend_messages(&[message("m1", "1@s.whatsapp.net", false)]);
    cache.prepend_messages(&[
        message("m2", "1@s.whatsapp.net", false),
        message("m3", "1@s.whatsapp.net", true),
    ]);

    // THEN: m2, m3, m1 overall; chat history holds inbound only
    let ids: Vec<&str> = cache
        .messages()
        .iter()
        .filter_map(|m| m["key"]["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["m2", "m3", "m1"]);

    let chat = cache.find_chat("1@s.whatsapp.net").expect("chat should exist");
    assert_eq!(chat.messages.len(), 2);
    assert_eq!(cache.messages_for("1@s.whatsapp.net").len(), 3);
    assert!(cache.messages_for("2@s.whatsapp.net").is_empty());
}

#[test]
fn given_mixed_chats_when_groups_then_returns_group_namespace_only() {
    let mut cache = StateCache::new();
    cache.load_chats(vec![
        record(json!({ "id": "1@s.whatsapp.net" })),
        record(json!({ "id": "1-2@g.us", "subject": "Team" })),
    ]);

    let groups = cache.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, "1-2@g.us");
}
