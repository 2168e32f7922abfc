//! MailStore trait and implementations
//!
//! The MailStore is the contract clients talk to: raw mail goes in, stored
//! mails come out. Stores can be layered. A layer only implements the
//! capabilities it changes and hands every other capability to the store it
//! wraps through [`MailStore::delegate`].

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::assembler::AttachmentContent;
use crate::error::{Error, Result};
use crate::types::{MailId, MailboxName, MailboxRecord, StoredMail};

pub mod r#impl;
pub mod searchable;

pub use searchable::SearchableMailStore;

/// Every operation a mail store declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    AddMail,
    DeleteMail,
    UpdateMail,
    GetMail,
    GetMails,
    AllMails,
    GetMailAttachment,
    AddMailbox,
    DeleteMailbox,
    GetMailboxNames,
    GetMailboxMailIds,
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Capability::AddMail,
        Capability::DeleteMail,
        Capability::UpdateMail,
        Capability::GetMail,
        Capability::GetMails,
        Capability::AllMails,
        Capability::GetMailAttachment,
        Capability::AddMailbox,
        Capability::DeleteMailbox,
        Capability::GetMailboxNames,
        Capability::GetMailboxMailIds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::AddMail => "add_mail",
            Capability::DeleteMail => "delete_mail",
            Capability::UpdateMail => "update_mail",
            Capability::GetMail => "get_mail",
            Capability::GetMails => "get_mails",
            Capability::AllMails => "all_mails",
            Capability::GetMailAttachment => "get_mail_attachment",
            Capability::AddMailbox => "add_mailbox",
            Capability::DeleteMailbox => "delete_mailbox",
            Capability::GetMailboxNames => "get_mailbox_names",
            Capability::GetMailboxMailIds => "get_mailbox_mail_ids",
        }
    }

    /// Whether the capability changes stored mail
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Capability::AddMail
                | Capability::DeleteMail
                | Capability::UpdateMail
                | Capability::DeleteMailbox
        )
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for storing and retrieving mail
///
/// The three mutations are required. Every other capability has a default
/// body that forwards to [`MailStore::delegate`], failing with
/// `Error::NotImplemented` when there is nothing to forward to.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Store a raw message in a mailbox
    async fn add_mail(&self, mailbox: &str, raw: &[u8]) -> Result<StoredMail>;

    /// Delete a stored mail
    async fn delete_mail(&self, id: &MailId) -> Result<()>;

    /// Persist tag and flag changes of a stored mail
    async fn update_mail(&self, mail: &StoredMail) -> Result<()>;

    /// The store this one wraps, if any
    fn delegate(&self) -> Option<&dyn MailStore> {
        None
    }

    /// Get a mail, with its body only when `include_body` is set
    async fn get_mail(&self, id: &MailId, include_body: bool) -> Result<Option<StoredMail>> {
        self.forward(Capability::GetMail)?
            .get_mail(id, include_body)
            .await
    }

    /// Get several mails; unknown idents are left out
    async fn get_mails(&self, ids: &[MailId]) -> Result<Vec<StoredMail>> {
        self.forward(Capability::GetMails)?.get_mails(ids).await
    }

    async fn all_mails(&self) -> Result<Vec<StoredMail>> {
        self.forward(Capability::AllMails)?.all_mails().await
    }

    /// Decoded content of the attachment stored under `ident`
    async fn get_mail_attachment(
        &self,
        ident: &str,
        encoding: Option<&str>,
    ) -> Result<Option<AttachmentContent>> {
        self.forward(Capability::GetMailAttachment)?
            .get_mail_attachment(ident, encoding)
            .await
    }

    /// Create a mailbox, or return the existing one
    async fn add_mailbox(&self, name: &str) -> Result<MailboxRecord> {
        self.forward(Capability::AddMailbox)?.add_mailbox(name).await
    }

    async fn delete_mailbox(&self, name: &str) -> Result<()> {
        self.forward(Capability::DeleteMailbox)?
            .delete_mailbox(name)
            .await
    }

    async fn get_mailbox_names(&self) -> Result<Vec<MailboxName>> {
        self.forward(Capability::GetMailboxNames)?
            .get_mailbox_names()
            .await
    }

    async fn get_mailbox_mail_ids(&self, name: &str) -> Result<Vec<MailId>> {
        self.forward(Capability::GetMailboxMailIds)?
            .get_mailbox_mail_ids(name)
            .await
    }

    /// The delegate, or `NotImplemented` for `capability`
    fn forward(&self, capability: Capability) -> Result<&dyn MailStore> {
        self.delegate().ok_or(Error::NotImplemented(capability))
    }
}

#[async_trait]
impl MailStore for Arc<dyn MailStore> {
    async fn add_mail(&self, mailbox: &str, raw: &[u8]) -> Result<StoredMail> {
        self.as_ref().add_mail(mailbox, raw).await
    }

    async fn delete_mail(&self, id: &MailId) -> Result<()> {
        self.as_ref().delete_mail(id).await
    }

    async fn update_mail(&self, mail: &StoredMail) -> Result<()> {
        self.as_ref().update_mail(mail).await
    }

    fn delegate(&self) -> Option<&dyn MailStore> {
        Some(self.as_ref())
    }
}
