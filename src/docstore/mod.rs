//! DocumentStore trait and implementations
//!
//! The document store is the underlying persistence layer: schemaless JSON
//! documents carrying a `type` discriminator, queryable through a fixed set
//! of secondary indexes. Mail heads, body contents, flags and mailboxes are
//! all stored as documents.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};

pub mod r#impl;

/// Document identifier assigned by the store
pub type DocId = String;

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub content: Value,
}

impl Document {
    pub fn new(id: impl Into<DocId>, content: Value) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }

    pub fn doc_type(&self) -> Option<DocType> {
        self.get_str("type").and_then(DocType::parse)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.content.get(key).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.content.get(key).and_then(Value::as_bool)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        if let Value::Object(map) = &mut self.content {
            map.insert(key.to_string(), value);
        }
    }
}

/// Kinds of documents the mail layer writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocType {
    Head,
    Content,
    Flags,
    Mailbox,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Head => "head",
            DocType::Content => "cnt",
            DocType::Flags => "flags",
            DocType::Mailbox => "mbx",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "head" => Some(DocType::Head),
            "cnt" => Some(DocType::Content),
            "flags" => Some(DocType::Flags),
            "mbx" => Some(DocType::Mailbox),
            _ => None,
        }
    }

    /// Types that belong to individual mails (as opposed to mailboxes)
    pub fn is_mail_document(&self) -> bool {
        matches!(self, DocType::Head | DocType::Content | DocType::Flags)
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary indexes available for `query_by_index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexName {
    ByType,
    ByTypeAndPayloadHash,
    ByTypeAndContentHash,
    ByTypeAndMailbox,
    ByTypeAndMailboxAndRecent,
}

impl IndexName {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexName::ByType => "by-type",
            IndexName::ByTypeAndPayloadHash => "by-type-and-payloadhash",
            IndexName::ByTypeAndContentHash => "by-type-and-contenthash",
            IndexName::ByTypeAndMailbox => "by-type-and-mbox",
            IndexName::ByTypeAndMailboxAndRecent => "by-type-and-mbox-and-recent",
        }
    }

    /// Document fields making up the index key, in key order
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            IndexName::ByType => &["type"],
            IndexName::ByTypeAndPayloadHash => &["type", "phash"],
            IndexName::ByTypeAndContentHash => &["type", "chash"],
            IndexName::ByTypeAndMailbox => &["type", "mbox"],
            IndexName::ByTypeAndMailboxAndRecent => &["type", "mbox", "recent"],
        }
    }

    /// Reject key lists whose arity does not match the index
    pub fn check_keys(&self, keys: &[&str]) -> Result<()> {
        if keys.len() != self.fields().len() {
            return Err(Error::Index(format!(
                "Index {} expects {} keys, got {}",
                self.as_str(),
                self.fields().len(),
                keys.len()
            )));
        }
        Ok(())
    }

    /// Whether `content` is listed under `keys` in this index
    pub fn matches(&self, content: &Value, keys: &[&str]) -> bool {
        self.fields()
            .iter()
            .zip(keys)
            .all(|(field, key)| index_key(content.get(*field)).as_deref() == Some(*key))
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index key representation of a field value
///
/// Booleans index as `"1"`/`"0"`, numbers by their decimal form. Missing,
/// null and compound values are not indexed.
pub fn index_key(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some("0".to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Trait for the underlying document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents listed under `keys` in `index`, in insertion order
    async fn query_by_index(&self, index: IndexName, keys: &[&str]) -> Result<Vec<Document>>;

    /// Retrieve a document by its ID
    async fn get_doc(&self, id: &str) -> Result<Option<Document>>;

    /// Store a new document and return it with its assigned ID
    async fn create_doc(&self, content: Value) -> Result<Document>;

    /// Replace the content of an existing document
    async fn put_doc(&self, doc: &Document) -> Result<()>;

    /// Delete a document
    async fn delete_doc(&self, id: &str) -> Result<()>;

    /// All documents, in insertion order
    async fn all_docs(&self) -> Result<Vec<Document>>;
}
