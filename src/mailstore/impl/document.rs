//! Mail store over the document store

use async_trait::async_trait;
use std::sync::Arc;

use crate::assembler::AttachmentContent;
use crate::error::Result;
use crate::mail::InputMail;
use crate::mailstore::MailStore;
use crate::querier::MailQuerier;
use crate::types::{MailId, MailboxName, MailboxRecord, StoredMail};

/// Mail store that keeps every mail as documents through a [`MailQuerier`]
///
/// Implements the full capability set itself; it has no delegate.
pub struct DocumentMailStore {
    querier: Arc<MailQuerier>,
}

impl DocumentMailStore {
    pub fn new(querier: Arc<MailQuerier>) -> Self {
        Self { querier }
    }

    pub fn querier(&self) -> &Arc<MailQuerier> {
        &self.querier
    }
}

#[async_trait]
impl MailStore for DocumentMailStore {
    async fn add_mail(&self, mailbox: &str, raw: &[u8]) -> Result<StoredMail> {
        let mail = InputMail::from_raw(raw)?;
        self.querier.create_mail(&mail, mailbox).await
    }

    async fn delete_mail(&self, id: &MailId) -> Result<()> {
        self.querier.remove_mail(id).await
    }

    async fn update_mail(&self, mail: &StoredMail) -> Result<()> {
        self.querier.update_mail(mail).await
    }

    async fn get_mail(&self, id: &MailId, include_body: bool) -> Result<Option<StoredMail>> {
        self.querier.mail(id, include_body).await
    }

    async fn get_mails(&self, ids: &[MailId]) -> Result<Vec<StoredMail>> {
        self.querier.mails(ids).await
    }

    async fn all_mails(&self) -> Result<Vec<StoredMail>> {
        self.querier.all_mails().await
    }

    async fn get_mail_attachment(
        &self,
        ident: &str,
        encoding: Option<&str>,
    ) -> Result<Option<AttachmentContent>> {
        self.querier.attachment(ident, encoding).await
    }

    async fn add_mailbox(&self, name: &str) -> Result<MailboxRecord> {
        self.querier.get_or_create_mailbox(name).await
    }

    async fn delete_mailbox(&self, name: &str) -> Result<()> {
        self.querier.delete_mailbox(name).await
    }

    async fn get_mailbox_names(&self) -> Result<Vec<MailboxName>> {
        self.querier.mailbox_names().await
    }

    async fn get_mailbox_mail_ids(&self, name: &str) -> Result<Vec<MailId>> {
        self.querier.mailbox_mail_ids(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::r#impl::InMemoryDocumentStore;
    use crate::types::MessageFlag;
    use crate::uid::r#impl::InMemoryUidIndexer;

    const MAIL: &str = "From: alice@example.com\r\nTo: bob@example.com\r\nSubject: Hello\r\n\r\nhi bob\r\n";

    fn store() -> DocumentMailStore {
        let querier = MailQuerier::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryUidIndexer::new()),
        );
        DocumentMailStore::new(Arc::new(querier))
    }

    #[tokio::test]
    async fn test_add_and_get_mail() {
        let store = store();

        let stored = store.add_mail("INBOX", MAIL.as_bytes()).await.unwrap();
        assert_eq!(stored.uid, 1);
        assert_eq!(stored.subject(), "Hello");
        assert_eq!(stored.text_body().trim_end(), "hi bob");

        let fetched = store.get_mail(&stored.ident, false).await.unwrap().unwrap();
        assert_eq!(fetched.ident, stored.ident);
        assert!(fetched.body.is_none());
        assert!(fetched.flags.contains(&MessageFlag::Recent));
    }

    #[tokio::test]
    async fn test_update_and_delete_mail() {
        let store = store();
        let mut stored = store.add_mail("INBOX", MAIL.as_bytes()).await.unwrap();

        stored.flags = vec![MessageFlag::Seen];
        stored.tags.insert("work");
        store.update_mail(&stored).await.unwrap();

        let fetched = store.get_mail(&stored.ident, false).await.unwrap().unwrap();
        assert!(fetched.is_seen());
        assert!(!fetched.flags.contains(&MessageFlag::Recent));
        assert!(fetched.tags.contains("work"));

        store.delete_mail(&stored.ident).await.unwrap();
        assert!(store.get_mail(&stored.ident, false).await.unwrap().is_none());
        assert!(store.get_mailbox_mail_ids("INBOX").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mailbox_capabilities() {
        let store = store();
        store.add_mailbox("INBOX").await.unwrap();
        store.add_mailbox("Sent").await.unwrap();
        store.add_mailbox("INBOX").await.unwrap();

        assert_eq!(
            store.get_mailbox_names().await.unwrap(),
            vec!["INBOX".to_string(), "Sent".to_string()]
        );

        store.delete_mailbox("Sent").await.unwrap();
        assert_eq!(store.get_mailbox_names().await.unwrap(), vec!["INBOX".to_string()]);
    }
}
