//! In-memory search engine implementation

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::search::{IndexedMail, SearchEngine, SearchQuery};
use crate::types::{MailId, StoredMail};

fn contains_words(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    needle
        .split_whitespace()
        .all(|word| haystack.contains(&word.to_lowercase()))
}

fn matches(query: &SearchQuery, mail: &IndexedMail) -> bool {
    match query {
        SearchQuery::All => true,
        SearchQuery::Text(text) => {
            let all = format!("{} {} {} {}", mail.subject, mail.from, mail.to, mail.body);
            contains_words(&all, text)
        }
        SearchQuery::From(text) => contains_words(&mail.from, text),
        SearchQuery::To(text) => contains_words(&mail.to, text),
        SearchQuery::Subject(text) => contains_words(&mail.subject, text),
        SearchQuery::Body(text) => contains_words(&mail.body, text),
        SearchQuery::Tag(tag) => mail.all_tags().iter().any(|t| t == tag),
        SearchQuery::Mailbox(name) => &mail.mailbox == name,
        SearchQuery::And(queries) => queries.iter().all(|q| matches(q, mail)),
        SearchQuery::Or(queries) => queries.iter().any(|q| matches(q, mail)),
        SearchQuery::Not(query) => !matches(query, mail),
    }
}

/// Search engine keeping its entries in a map keyed by ident
pub struct InMemorySearchEngine {
    entries: RwLock<BTreeMap<MailId, IndexedMail>>,
}

impl InMemorySearchEngine {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemorySearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchEngine for InMemorySearchEngine {
    async fn index_mail(&self, mail: &StoredMail) -> Result<()> {
        let entry = IndexedMail::from_mail(mail);
        self.entries.write().await.insert(entry.ident.clone(), entry);
        Ok(())
    }

    async fn remove_from_index(&self, id: &MailId) -> Result<()> {
        self.entries.write().await.remove(id);
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MailId>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|mail| matches(query, mail))
            .map(|mail| mail.ident.clone())
            .collect())
    }

    async fn tags(&self) -> Result<Vec<String>> {
        let tags: BTreeSet<String> = self
            .entries
            .read()
            .await
            .values()
            .flat_map(|mail| mail.tags.iter().cloned())
            .collect();
        Ok(tags.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(ident: &str, subject: &str, tags: &[&str]) -> StoredMail {
        let mut mail = StoredMail::new(ident, "INBOX");
        mail.headers.push("Subject", subject);
        for tag in tags {
            mail.tags.insert(*tag);
        }
        mail
    }

    #[tokio::test]
    async fn test_reindex_replaces_entry() {
        let engine = InMemorySearchEngine::new();
        engine.index_mail(&mail("a", "first", &[])).await.unwrap();
        engine.index_mail(&mail("a", "second", &[])).await.unwrap();

        assert_eq!(engine.len().await, 1);
        assert!(engine
            .search(&SearchQuery::Subject("first".to_string()))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            engine.search(&SearchQuery::Subject("second".to_string())).await.unwrap(),
            vec![MailId::from("a")]
        );
    }

    #[tokio::test]
    async fn test_tag_queries_are_case_sensitive() {
        let engine = InMemorySearchEngine::new();
        engine.index_mail(&mail("a", "s", &["ImPoRtAnT"])).await.unwrap();

        let found = |tag: &str| SearchQuery::Tag(tag.to_string());
        assert_eq!(engine.search(&found("ImPoRtAnT")).await.unwrap().len(), 1);
        assert!(engine.search(&found("important")).await.unwrap().is_empty());
        assert_eq!(engine.search(&found("inbox")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_boolean_queries() {
        let engine = InMemorySearchEngine::new();
        engine.index_mail(&mail("a", "lunch plans", &["friends"])).await.unwrap();
        engine.index_mail(&mail("b", "lunch invoice", &["work"])).await.unwrap();

        let query = SearchQuery::And(vec![
            SearchQuery::Text("lunch".to_string()),
            SearchQuery::Not(Box::new(SearchQuery::Tag("work".to_string()))),
        ]);
        assert_eq!(engine.search(&query).await.unwrap(), vec![MailId::from("a")]);

        let query = SearchQuery::Or(vec![
            SearchQuery::Tag("work".to_string()),
            SearchQuery::Tag("friends".to_string()),
        ]);
        assert_eq!(engine.search(&query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_and_tags() {
        let engine = InMemorySearchEngine::new();
        engine.index_mail(&mail("a", "s", &["work", "later"])).await.unwrap();
        engine.index_mail(&mail("b", "s", &["work"])).await.unwrap();

        assert_eq!(engine.tags().await.unwrap(), vec!["later".to_string(), "work".to_string()]);

        engine.remove_from_index(&MailId::from("a")).await.unwrap();
        engine.remove_from_index(&MailId::from("missing")).await.unwrap();
        assert_eq!(engine.tags().await.unwrap(), vec!["work".to_string()]);
    }
}
