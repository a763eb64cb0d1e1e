//! Best-effort mapping from anonymized (`@lid`) identifiers to phone-number
//! identifiers.
//!
//! Records coming from the protocol library sometimes carry both forms of the
//! same account (for example a contact with `id: "123@lid"` and
//! `jid: "555@s.whatsapp.net"`). Each inserted or merged record is scanned
//! once and every anonymized numeric part found in it is mapped to the first
//! phone-number identifier found in the same record. A lookup miss returns
//! the input unchanged.

use crate::jid::{self, anonymized_jid_regex, phone_jid_regex};
use crate::protocol::Record;

use std::collections::HashMap;

use log::{debug, info};
use serde_json::Value;

/// Anonymized numeric part → phone-number identifier for one record set.
#[derive(Debug, Default, Clone)]
pub struct IdentityIndex {
    by_anonymized: HashMap<String, String>,
}

impl IdentityIndex {
    /// Indexes the tokens of one record. Earlier records win on conflicts.
    pub fn index_record(&mut self, id: &str, fields: &Record) {
        let mut strings = vec![id];
        for value in fields.values() {
            collect_strings(value, &mut strings);
        }

        let Some(phone) = strings
            .iter()
            .find_map(|s| phone_jid_regex().find(s).map(|m| m.as_str().to_string()))
        else {
            return;
        };

        for s in &strings {
            for captures in anonymized_jid_regex().captures_iter(s) {
                if let Some(numeric) = captures.get(1) {
                    self.by_anonymized
                        .entry(numeric.as_str().to_string())
                        .or_insert_with(|| phone.clone());
                }
            }
        }
    }

    pub fn lookup(&self, numeric: &str) -> Option<&str> {
        self.by_anonymized.get(numeric).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.by_anonymized.clear();
    }

    pub fn len(&self) -> usize {
        self.by_anonymized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_anonymized.is_empty()
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Contacts are consulted before chats.
#[derive(Debug, Default, Clone)]
pub struct IdentityResolver {
    contacts: IdentityIndex,
    chats: IdentityIndex,
}

impl IdentityResolver {
    pub fn contacts_mut(&mut self) -> &mut IdentityIndex {
        &mut self.contacts
    }

    pub fn chats_mut(&mut self) -> &mut IdentityIndex {
        &mut self.chats
    }

    pub fn resolve(&self, id: &str) -> String {
        if id.is_empty() || jid::is_phone_number(id) {
            return id.to_string();
        }

        let numeric = jid::numeric_part(id);
        self.contacts
            .lookup(numeric)
            .or_else(|| self.chats.lookup(numeric))
            .map(str::to_string)
            .unwrap_or_else(|| id.to_string())
    }

    /// Resolves a message's chat id, falling back to the group participant
    /// when the chat id stays anonymized.
    pub fn resolve_sender(&self, remote_jid: &str, participant: Option<&str>) -> String {
        let resolved = self.resolve(remote_jid);
        match participant {
            Some(participant) if jid::is_anonymized(&resolved) && !participant.is_empty() => {
                self.resolve(participant)
            }
            _ => resolved,
        }
    }

    /// Logs the outcome for an anonymized chat id.
    pub(crate) fn log_outcome(remote_jid: &str, resolved: &str) {
        if !jid::is_anonymized(remote_jid) {
            return;
        }
        if resolved != remote_jid {
            info!("Resolved {} -> {}", remote_jid, resolved);
        } else {
            debug!("Resolution pending for {}", remote_jid);
        }
    }
}
