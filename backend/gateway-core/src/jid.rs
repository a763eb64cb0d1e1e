//! Chat identifier helpers.
//!
//! Identifiers are `<numeric>@<server>` strings. Phone-number users live on
//! `s.whatsapp.net`, groups on `g.us` and privacy-masked users on `lid`.

use std::sync::OnceLock;

use const_format::concatcp;
use regex::Regex;

const USER_SERVER: &str = "s.whatsapp.net";
const GROUP_SERVER: &str = "g.us";
const ANONYMIZED_SERVER: &str = "lid";

pub const USER_SUFFIX: &str = concatcp!("@", USER_SERVER);
pub const GROUP_SUFFIX: &str = concatcp!("@", GROUP_SERVER);
pub const ANONYMIZED_SUFFIX: &str = concatcp!("@", ANONYMIZED_SERVER);

/// Group ids created by older clients look like `<creator>-<timestamp>`.
const GROUP_ID_MARKER: char = '-';

const PHONE_JID_PATTERN: &str = r"\d+@s\.whatsapp\.net";
const ANONYMIZED_JID_PATTERN: &str = r"(\d+)@lid";

pub(crate) fn phone_jid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PHONE_JID_PATTERN).expect("valid regex pattern"))
}

pub(crate) fn anonymized_jid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ANONYMIZED_JID_PATTERN).expect("valid regex pattern"))
}

/// Normalizes a caller-supplied recipient into a full identifier.
///
/// Ids already carrying one of the known suffixes are returned as is. Bare
/// ids containing the group marker become group ids, everything else a
/// phone id.
pub fn create_id(raw: &str) -> String {
    if [USER_SUFFIX, GROUP_SUFFIX, ANONYMIZED_SUFFIX]
        .iter()
        .any(|suffix| raw.contains(suffix))
    {
        return raw.to_string();
    }
    if raw.contains(GROUP_ID_MARKER) {
        format!("{raw}{GROUP_SUFFIX}")
    } else {
        format!("{raw}{USER_SUFFIX}")
    }
}

/// Strips device and server parts: `123:4@s.whatsapp.net` -> `123@s.whatsapp.net`.
pub fn make_user_id(jid: &str) -> String {
    let user = jid.split([':', '@']).next().unwrap_or(jid);
    format!("{user}{USER_SUFFIX}")
}

pub fn is_group(jid: &str) -> bool {
    jid.ends_with(GROUP_SUFFIX)
}

pub fn is_anonymized(jid: &str) -> bool {
    jid.ends_with(ANONYMIZED_SUFFIX)
}

pub fn is_phone_number(jid: &str) -> bool {
    jid.ends_with(USER_SUFFIX)
}

/// Recipients that are never looked up in the registration directory.
pub fn skips_registration(jid: &str) -> bool {
    jid.contains(GROUP_SUFFIX) || jid.contains(ANONYMIZED_SUFFIX)
}

/// Part before the `@`, or the whole input when there is none.
pub fn numeric_part(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}
