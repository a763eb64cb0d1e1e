//! Per-instance projection of chats, contacts and messages.

use crate::identity::IdentityResolver;
use crate::jid;
use crate::protocol::Record;

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

const MESSAGES_FIELD: &str = "messages";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Record,
    pub messages: Vec<Record>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContactRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Record,
}

/// Splits the mandatory `id` off a library record.
fn split_id(mut record: Record) -> Option<(String, Record)> {
    match record.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => Some((id, record)),
        _ => {
            warn!("Dropping record without an id");
            None
        }
    }
}

fn chat_from(record: Record) -> Option<ChatRecord> {
    let (id, mut fields) = split_id(record)?;
    fields.remove(MESSAGES_FIELD);
    Some(ChatRecord {
        id,
        fields,
        messages: Vec::new(),
    })
}

fn contact_from(record: Record) -> Option<ContactRecord> {
    let (id, fields) = split_id(record)?;
    Some(ContactRecord { id, fields })
}

fn message_chat_id(message: &Record) -> Option<&str> {
    message
        .get("key")
        .and_then(|key| key.get("remoteJid"))
        .and_then(Value::as_str)
}

pub(crate) fn is_from_me(message: &Record) -> bool {
    message
        .get("key")
        .and_then(|key| key.get("fromMe"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[derive(Debug, Default)]
pub struct StateCache {
    chats: Vec<ChatRecord>,
    contacts: Vec<ContactRecord>,
    /// Most recent first.
    messages: Vec<Record>,
    resolver: IdentityResolver,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ============================================
    // CHATS
    // ============================================

    /// Initial chat load. Appends without deduplicating.
    pub fn load_chats(&mut self, chats: Vec<Record>) {
        let before = self.chats.len();
        for chat in chats.into_iter().filter_map(chat_from) {
            self.resolver.chats_mut().index_record(&chat.id, &chat.fields);
            self.chats.push(chat);
        }
        debug!("Loaded {} chats", self.chats.len() - before);
    }

    /// Merge into an existing chat or append a new one.
    pub fn upsert_chats(&mut self, chats: Vec<Record>) {
        for incoming in chats.into_iter().filter_map(chat_from) {
            match self.chats.iter_mut().find(|c| c.id == incoming.id) {
                Some(existing) => {
                    existing.fields.extend(incoming.fields);
                    self.resolver
                        .chats_mut()
                        .index_record(&existing.id, &existing.fields);
                }
                None => {
                    self.resolver
                        .chats_mut()
                        .index_record(&incoming.id, &incoming.fields);
                    self.chats.push(incoming);
                }
            }
        }
    }

    /// Shallow merge over existing chats; unknown ids are ignored.
    pub fn update_chats(&mut self, updates: Vec<Record>) {
        for update in updates.into_iter().filter_map(chat_from) {
            let Some(existing) = self.chats.iter_mut().find(|c| c.id == update.id) else {
                debug!("Ignoring update for unknown chat {}", update.id);
                continue;
            };
            existing.fields.extend(update.fields);
            self.resolver
                .chats_mut()
                .index_record(&existing.id, &existing.fields);
        }
    }

    pub fn delete_chats(&mut self, ids: &[String]) {
        let mut removed = false;
        for id in ids {
            if let Some(pos) = self.chats.iter().position(|c| &c.id == id) {
                self.chats.remove(pos);
                removed = true;
            }
        }
        if removed {
            self.rebuild_chat_index();
        }
    }

    // ============================================
    // CONTACTS
    // ============================================

    /// Replaces the whole contact list.
    pub fn set_contacts(&mut self, contacts: Vec<Record>) {
        self.contacts = contacts.into_iter().filter_map(contact_from).collect();
        let index = self.resolver.contacts_mut();
        index.clear();
        for contact in &self.contacts {
            index.index_record(&contact.id, &contact.fields);
        }
        debug!("Contact list replaced with {} entries", self.contacts.len());
    }

    pub fn upsert_contacts(&mut self, contacts: Vec<Record>) {
        for incoming in contacts.into_iter().filter_map(contact_from) {
            match self.contacts.iter_mut().find(|c| c.id == incoming.id) {
                Some(existing) => {
                    existing.fields.extend(incoming.fields);
                    self.resolver
                        .contacts_mut()
                        .index_record(&existing.id, &existing.fields);
                }
                None => {
                    self.resolver
                        .contacts_mut()
                        .index_record(&incoming.id, &incoming.fields);
                    self.contacts.push(incoming);
                }
            }
        }
    }

    pub fn update_contacts(&mut self, updates: Vec<Record>) {
        for update in updates.into_iter().filter_map(contact_from) {
            let Some(existing) = self.contacts.iter_mut().find(|c| c.id == update.id) else {
                continue;
            };
            existing.fields.extend(update.fields);
            self.resolver
                .contacts_mut()
                .index_record(&existing.id, &existing.fields);
        }
    }

    // ============================================
    // MESSAGES
    // ============================================

    /// Puts a batch at the head of the message list keeping batch order, and
    /// appends inbound messages to their chat.
    pub fn prepend_messages(&mut self, batch: &[Record]) {
        for message in batch {
            if is_from_me(message) {
                continue;
            }
            if let Some(chat_id) = message_chat_id(message)
                && let Some(chat) = self.chats.iter_mut().find(|c| c.id == chat_id)
            {
                chat.messages.push(message.clone());
            }
        }
        self.messages.splice(0..0, batch.iter().cloned());
    }

    // ============================================
    // READ SIDE
    // ============================================

    pub fn chats(&self) -> &[ChatRecord] {
        &self.chats
    }

    pub fn contacts(&self) -> &[ContactRecord] {
        &self.contacts
    }

    pub fn messages(&self) -> &[Record] {
        &self.messages
    }

    pub fn messages_for(&self, chat_id: &str) -> Vec<Record> {
        self.messages
            .iter()
            .filter(|m| message_chat_id(m) == Some(chat_id))
            .cloned()
            .collect()
    }

    pub fn find_chat(&self, id: &str) -> Option<&ChatRecord> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn groups(&self) -> Vec<ChatRecord> {
        self.chats
            .iter()
            .filter(|c| jid::is_group(&c.id))
            .cloned()
            .collect()
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn resolve(&self, id: &str) -> String {
        self.resolver.resolve(id)
    }

    fn rebuild_chat_index(&mut self) {
        let index = self.resolver.chats_mut();
        index.clear();
        for chat in &self.chats {
            index.index_record(&chat.id, &chat.fields);
        }
    }
}
