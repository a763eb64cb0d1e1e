// Unit tests for inbound message webhook payloads

use crate::identity::IdentityResolver;
use crate::instance::events::{message_type, message_webhook_payload};
use crate::protocol::Record;

use serde_json::{Value, json};

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn inbound(remote: &str, content: Value) -> Record {
    record(json!({
        "key": { "id": "m1", "remoteJid": remote, "fromMe": false },
        "message": content,
        "pushName": "Ana",
    }))
}

/// **VALUE**: Verifies the payload carries routing fields plus the original message.
///
/// **WHY THIS MATTERS**: Webhook consumers route on `instance_key` and `messageType`
/// and read content from the spread message fields.
#[test]
fn given_text_message_when_payload_built_then_has_routing_fields_and_text() {
    // GIVEN: An inbound conversation message
    let message = inbound("1@s.whatsapp.net", json!({ "conversation": "hello" }));

    // WHEN: Building the payload
    let payload = message_webhook_payload(
        "abc",
        Some("9@s.whatsapp.net"),
        &message,
        &IdentityResolver::default(),
    )
    .expect("payload should be built");

    // THEN: Routing fields, spread fields and the text mirror
    assert_eq!(payload["instance_key"], json!("abc"));
    assert_eq!(payload["jid"], json!("9@s.whatsapp.net"));
    assert_eq!(payload["messageType"], json!("conversation"));
    assert_eq!(payload["remoteJid"], json!("1@s.whatsapp.net"));
    assert_eq!(payload["remoteJidFone"], json!("1@s.whatsapp.net"));
    assert_eq!(payload["pushName"], json!("Ana"));
    assert_eq!(payload["text"]["message"]["conversation"], json!("hello"));
    assert!(payload.get("resolvedJid").is_none());
}

/// **VALUE**: Verifies self-sent, empty and control messages are never relayed.
///
/// **BUG THIS CATCHES**: Would catch webhook loops where the gateway relays its own
/// outgoing messages back to the consumer that sent them.
#[test]
fn given_filtered_messages_when_payload_built_then_none() {
    let resolver = IdentityResolver::default();

    let mut own = inbound("1@s.whatsapp.net", json!({ "conversation": "me" }));
    own.insert(
        "key".into(),
        json!({ "id": "m2", "remoteJid": "1@s.whatsapp.net", "fromMe": true }),
    );
    assert!(message_webhook_payload("abc", None, &own, &resolver).is_none());

    let empty = inbound("1@s.whatsapp.net", Value::Null);
    assert!(message_webhook_payload("abc", None, &empty, &resolver).is_none());

    let control = inbound(
        "1@s.whatsapp.net",
        json!({ "protocolMessage": { "type": 0 } }),
    );
    assert!(message_webhook_payload("abc", None, &control, &resolver).is_none());
}

/// **VALUE**: Verifies anonymized senders are resolved and flagged.
#[test]
fn given_anonymized_sender_with_known_contact_when_payload_built_then_resolved_jid_set() {
    // GIVEN: A contact mapping 111@lid to a phone jid
    let mut resolver = IdentityResolver::default();
    resolver.contacts_mut().index_record(
        "111@lid",
        &record(json!({ "jid": "5511@s.whatsapp.net" })),
    );
    let message = inbound("111@lid", json!({ "imageMessage": { "url": "x" } }));

    // WHEN: Building the payload
    let payload =
        message_webhook_payload("abc", None, &message, &resolver).expect("payload should be built");

    // THEN: Both forms present
    assert_eq!(payload["remoteJid"], json!("111@lid"));
    assert_eq!(payload["remoteJidFone"], json!("5511@s.whatsapp.net"));
    assert_eq!(payload["resolvedJid"], json!("5511@s.whatsapp.net"));
    assert!(payload.get("text").is_none());
}

#[test]
fn given_message_when_message_type_then_first_content_key() {
    let message = inbound(
        "1@s.whatsapp.net",
        json!({ "extendedTextMessage": { "text": "x" }, "messageContextInfo": {} }),
    );
    assert_eq!(message_type(&message), Some("extendedTextMessage"));
}
