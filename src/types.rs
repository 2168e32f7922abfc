//! Core types used throughout the mail store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::assembler::ReconstructedMessage;

/// Message UID (unique within a mailbox, never reused)
pub type Uid = u32;

/// Mailbox name
pub type MailboxName = String;

/// Global identifier of a stored mail (the content hash of the raw message)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailId(pub String);

impl MailId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MailId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Ordered list of header name/value pairs
///
/// Serialized as `[[name, value], ...]`. Deserialization also accepts an
/// object of `name: value` entries, which some head documents carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HeadersRepr")]
pub struct Headers(Vec<(String, String)>);

#[derive(Deserialize)]
#[serde(untagged)]
enum HeadersRepr {
    Pairs(Vec<(String, String)>),
    Map(serde_json::Map<String, Value>),
}

impl From<HeadersRepr> for Headers {
    fn from(repr: HeadersRepr) -> Self {
        match repr {
            HeadersRepr::Pairs(pairs) => Headers(pairs),
            HeadersRepr::Map(map) => Headers(
                map.into_iter()
                    .filter_map(|(name, value)| match value {
                        Value::String(s) => Some((name, s)),
                        Value::Array(values) => {
                            let joined = values
                                .iter()
                                .filter_map(|v| v.as_str())
                                .collect::<Vec<_>>()
                                .join(", ");
                            Some((name, joined))
                        }
                        Value::Null => None,
                        other => Some((name, other.to_string())),
                    })
                    .collect(),
            ),
        }
    }
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`, compared case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(String, String)>> for Headers {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Headers(pairs)
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Headers(iter.into_iter().collect())
    }
}

/// Message flags as defined by IMAP
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageFlag {
    Seen,
    Answered,
    Flagged,
    Deleted,
    Draft,
    Recent,
    Custom(String),
}

impl MessageFlag {
    pub fn to_imap_string(&self) -> String {
        match self {
            MessageFlag::Seen => "\\Seen".to_string(),
            MessageFlag::Answered => "\\Answered".to_string(),
            MessageFlag::Flagged => "\\Flagged".to_string(),
            MessageFlag::Deleted => "\\Deleted".to_string(),
            MessageFlag::Draft => "\\Draft".to_string(),
            MessageFlag::Recent => "\\Recent".to_string(),
            MessageFlag::Custom(s) => s.clone(),
        }
    }

    pub fn from_imap_string(s: &str) -> Self {
        match s {
            "\\Seen" => MessageFlag::Seen,
            "\\Answered" => MessageFlag::Answered,
            "\\Flagged" => MessageFlag::Flagged,
            "\\Deleted" => MessageFlag::Deleted,
            "\\Draft" => MessageFlag::Draft,
            "\\Recent" => MessageFlag::Recent,
            _ => MessageFlag::Custom(s.to_string()),
        }
    }
}

/// Case-preserving, case-sensitive set of tags
///
/// Inserting a tag that matches an existing one case-insensitively keeps the
/// casing already stored; lookups compare exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the tag (in any casing) was already present
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.0.iter().any(|t| t.to_lowercase() == tag.to_lowercase()) {
            return false;
        }
        self.0.insert(tag)
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        self.0.remove(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

/// Mailbox metadata as persisted in its `mbx` document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxRecord {
    pub name: MailboxName,
    pub uuid: Uuid,
    pub last_uid: Uid,
}

/// A mail as the store hands it out
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMail {
    pub ident: MailId,
    pub mailbox: MailboxName,
    pub uid: Uid,
    pub headers: Headers,
    pub tags: TagSet,
    pub flags: Vec<MessageFlag>,
    pub date: Option<DateTime<Utc>>,
    /// Present only when the body was requested
    pub body: Option<ReconstructedMessage>,
}

impl StoredMail {
    /// Bare mail with no headers, tags or body
    pub fn new(ident: impl Into<MailId>, mailbox: impl Into<MailboxName>) -> Self {
        Self {
            ident: ident.into(),
            mailbox: mailbox.into(),
            uid: 0,
            headers: Headers::new(),
            tags: TagSet::new(),
            flags: Vec::new(),
            date: None,
            body: None,
        }
    }

    pub fn subject(&self) -> &str {
        self.headers.get("Subject").unwrap_or("")
    }

    pub fn sender(&self) -> &str {
        self.headers.get("From").unwrap_or("")
    }

    pub fn recipients(&self) -> &str {
        self.headers.get("To").unwrap_or("")
    }

    pub fn is_seen(&self) -> bool {
        self.flags.contains(&MessageFlag::Seen)
    }

    /// Concatenated text of all body alternatives, empty when no body was loaded
    pub fn text_body(&self) -> String {
        self.body
            .as_ref()
            .map(|body| {
                body.alternatives
                    .iter()
                    .map(|alt| alt.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

impl From<String> for MailId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
