//! Mail store layer keeping a search index in step with stored mail

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::mailstore::MailStore;
use crate::search::SearchEngine;
use crate::types::{MailId, StoredMail};

/// Wraps a mail store and mirrors its mutations into a search engine
///
/// `add_mail`, `delete_mail` and `update_mail` are mirrored here, and so is
/// `delete_mailbox`, which takes the mailbox's mails with it. Those calls
/// still reach the wrapped store with the same arguments, result and error;
/// every other capability is forwarded untouched. The index is
/// touched only after the wrapped store has acknowledged the mutation. A
/// failing index step is reported to the caller without undoing the store
/// write, so retrying the whole operation brings the index back in line.
pub struct SearchableMailStore<S: MailStore> {
    delegate: S,
    search_engine: Arc<dyn SearchEngine>,
}

impl<S: MailStore> SearchableMailStore<S> {
    pub fn new(delegate: S, search_engine: Arc<dyn SearchEngine>) -> Self {
        Self {
            delegate,
            search_engine,
        }
    }

    pub fn search_engine(&self) -> &Arc<dyn SearchEngine> {
        &self.search_engine
    }

    /// Run an index step on its own task
    ///
    /// The spawned task keeps running even if the caller's future is
    /// dropped while awaiting it.
    async fn sync_index<F>(&self, step: impl FnOnce(Arc<dyn SearchEngine>) -> F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let task = tokio::spawn(step(Arc::clone(&self.search_engine)));
        let result = task.await?;
        if let Err(e) = &result {
            log::error!("Search index update failed: {}", e);
        }
        result
    }
}

#[async_trait]
impl<S: MailStore> MailStore for SearchableMailStore<S> {
    async fn add_mail(&self, mailbox: &str, raw: &[u8]) -> Result<StoredMail> {
        let stored = self.delegate.add_mail(mailbox, raw).await?;

        let mail = stored.clone();
        self.sync_index(|engine| async move { engine.index_mail(&mail).await })
            .await?;

        Ok(stored)
    }

    async fn delete_mail(&self, id: &MailId) -> Result<()> {
        self.delegate.delete_mail(id).await?;

        let id = id.clone();
        self.sync_index(|engine| async move { engine.remove_from_index(&id).await })
            .await
    }

    async fn update_mail(&self, mail: &StoredMail) -> Result<()> {
        self.delegate.update_mail(mail).await?;

        let mail = mail.clone();
        self.sync_index(|engine| async move { engine.index_mail(&mail).await })
            .await
    }

    async fn delete_mailbox(&self, name: &str) -> Result<()> {
        let ids = self.delegate.get_mailbox_mail_ids(name).await?;
        self.delegate.delete_mailbox(name).await?;

        self.sync_index(|engine| async move {
            for id in &ids {
                engine.remove_from_index(id).await?;
            }
            Ok(())
        })
        .await
    }

    fn delegate(&self) -> Option<&dyn MailStore> {
        Some(&self.delegate)
    }
}
