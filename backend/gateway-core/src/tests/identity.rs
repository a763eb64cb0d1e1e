// Unit tests for anonymized identifier resolution

use crate::identity::{IdentityIndex, IdentityResolver};
use crate::protocol::Record;

use serde_json::{Value, json};

fn fields(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// **VALUE**: Verifies a record carrying both forms maps the anonymized id to the phone id.
///
/// **WHY THIS MATTERS**: Webhook consumers key their conversations by phone number.
/// Without resolution they see an opaque `@lid` id and split one customer into two.
#[test]
fn given_contact_with_both_forms_when_resolved_then_returns_phone_jid() {
    // GIVEN: A contact with an anonymized id and a phone jid field
    let mut resolver = IdentityResolver::default();
    resolver.contacts_mut().index_record(
        "111@lid",
        &fields(json!({ "jid": "5511999990000@s.whatsapp.net", "name": "Ana" })),
    );

    // WHEN: Resolving the anonymized id
    let resolved = resolver.resolve("111@lid");

    // THEN: Phone jid
    assert_eq!(resolved, "5511999990000@s.whatsapp.net");
}

/// **VALUE**: Verifies misses and phone ids come back unchanged.
///
/// **BUG THIS CATCHES**: Would catch resolution returning an empty string on miss.
#[test]
fn given_unknown_or_phone_ids_when_resolved_then_returns_input() {
    let resolver = IdentityResolver::default();

    assert_eq!(resolver.resolve("999@lid"), "999@lid");
    assert_eq!(resolver.resolve("1@s.whatsapp.net"), "1@s.whatsapp.net");
    assert_eq!(resolver.resolve(""), "");
}

/// **VALUE**: Verifies contacts take precedence over chats.
#[test]
fn given_conflicting_sources_when_resolved_then_contacts_win() {
    // GIVEN: Chat and contact disagree on the phone number for the same lid
    let mut resolver = IdentityResolver::default();
    resolver
        .chats_mut()
        .index_record("111@lid", &fields(json!({ "pnJid": "2@s.whatsapp.net" })));
    resolver
        .contacts_mut()
        .index_record("111@lid", &fields(json!({ "jid": "1@s.whatsapp.net" })));

    // WHEN / THEN: Contact mapping is used
    assert_eq!(resolver.resolve("111@lid"), "1@s.whatsapp.net");
}

/// **VALUE**: Verifies nested arrays and objects are scanned.
#[test]
fn given_nested_fields_when_indexed_then_finds_tokens() {
    let mut index = IdentityIndex::default();
    index.index_record(
        "group-x",
        &fields(json!({ "participants": [{ "id": "77@lid", "phone": "8@s.whatsapp.net" }] })),
    );

    assert_eq!(index.lookup("77"), Some("8@s.whatsapp.net"));
    assert_eq!(index.len(), 1);
}

#[test]
fn given_record_without_phone_when_indexed_then_index_stays_empty() {
    let mut index = IdentityIndex::default();
    index.index_record("77@lid", &fields(json!({ "name": "no phone" })));
    assert!(index.is_empty());
}

/// **VALUE**: Verifies the participant fallback for anonymized chat ids.
///
/// **BUG THIS CATCHES**: Would catch group messages from unknown chats reporting the
/// anonymized id even though the participant resolves.
#[test]
fn given_unresolved_remote_with_participant_when_resolve_sender_then_uses_participant() {
    let mut resolver = IdentityResolver::default();
    resolver
        .contacts_mut()
        .index_record("55@lid", &fields(json!({ "jid": "9@s.whatsapp.net" })));

    assert_eq!(
        resolver.resolve_sender("44@lid", Some("55@lid")),
        "9@s.whatsapp.net"
    );
    assert_eq!(resolver.resolve_sender("44@lid", None), "44@lid");
}
