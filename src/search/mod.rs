//! SearchEngine trait and implementations
//!
//! The search engine holds one entry per stored mail, keyed by its ident.
//! Indexing an ident that is already present replaces its entry.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MailId, MailboxName, StoredMail};

pub mod r#impl;

/// Trait for full-text search over stored mail
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Add the mail to the index, replacing any entry for its ident
    async fn index_mail(&self, mail: &StoredMail) -> Result<()>;

    /// Remove the entry for `id`; removing an unknown ident is not an error
    async fn remove_from_index(&self, id: &MailId) -> Result<()>;

    /// Idents of the entries matching `query`
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MailId>>;

    /// Every tag present on some indexed mail
    async fn tags(&self) -> Result<Vec<String>>;
}

/// Search criteria
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    All,
    /// Words in any of the text fields
    Text(String),
    From(String),
    To(String),
    Subject(String),
    Body(String),
    /// Exact tag; a mailbox's lowercased name counts as a tag of its mails
    Tag(String),
    Mailbox(MailboxName),
    And(Vec<SearchQuery>),
    Or(Vec<SearchQuery>),
    Not(Box<SearchQuery>),
}

/// The projection of a mail the search engines index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedMail {
    pub ident: MailId,
    pub mailbox: MailboxName,
    /// User tags
    pub tags: Vec<String>,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub body: String,
}

impl IndexedMail {
    pub fn from_mail(mail: &StoredMail) -> Self {
        Self {
            ident: mail.ident.clone(),
            mailbox: mail.mailbox.clone(),
            tags: mail.tags.to_vec(),
            subject: mail.subject().to_string(),
            from: mail.sender().to_string(),
            to: mail.recipients().to_string(),
            body: mail.text_body(),
        }
    }

    /// User tags plus the mailbox tag
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        let mailbox_tag = self.mailbox.to_lowercase();
        if !mailbox_tag.is_empty() && !tags.contains(&mailbox_tag) {
            tags.push(mailbox_tag);
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_of_stored_mail() {
        let mut mail = StoredMail::new("abc", "INBOX");
        mail.headers.push("Subject", "Quarterly numbers");
        mail.headers.push("From", "alice@example.com");
        mail.tags.insert("work");

        let indexed = IndexedMail::from_mail(&mail);

        assert_eq!(indexed.subject, "Quarterly numbers");
        assert_eq!(indexed.from, "alice@example.com");
        assert_eq!(indexed.to, "");
        assert_eq!(indexed.all_tags(), vec!["work".to_string(), "inbox".to_string()]);
    }
}
