//! MailQuerier: mail-level operations over the document store
//!
//! The querier resolves mailboxes, hands out UIDs, persists new mails as
//! document sets and rebuilds [`StoredMail`]s from them on read.
//!
//! Lookups keyed by an optional name or hash treat an empty or absent key
//! as "no result" and never reach the document store with it.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::assembler::{AttachmentContent, MessageAssembler, ReconstructedMessage};
use crate::body::BodyDocumentIndex;
use crate::docstore::{DocType, Document, DocumentStore, IndexName};
use crate::error::{Error, Result};
use crate::head::HeadDescriptor;
use crate::locks::LockTable;
use crate::mail::PersistableMail;
use crate::types::{MailId, MailboxName, MailboxRecord, MessageFlag, StoredMail, TagSet, Uid};
use crate::uid::UidIndexer;

/// Non-empty keys only
fn key(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn mailbox_record(doc: &Document) -> Result<MailboxRecord> {
    let name = doc.get_str("mbox").unwrap_or_default().to_string();
    let uuid = doc
        .get_str("uuid")
        .ok_or_else(|| Error::InvalidMailbox(format!("Mailbox {} has no uuid", name)))
        .and_then(|uuid| {
            Uuid::parse_str(uuid)
                .map_err(|e| Error::InvalidMailbox(format!("Mailbox {} uuid: {}", name, e)))
        })?;
    let last_uid = uid_field(doc, "lastuid")?.unwrap_or(0);

    Ok(MailboxRecord {
        name,
        uuid,
        last_uid,
    })
}

/// A UID-valued field, rejected when it does not fit a [`Uid`]
fn uid_field(doc: &Document, field: &str) -> Result<Option<Uid>> {
    doc.get_u64(field)
        .map(|value| {
            Uid::try_from(value).map_err(|_| {
                Error::InvalidState(format!(
                    "Document {} has out-of-range {} {}",
                    doc.id, field, value
                ))
            })
        })
        .transpose()
}

/// Flags as stored, with the boolean fields folded in
fn stored_flags(flags_doc: &Document) -> Vec<MessageFlag> {
    let mut flags: Vec<MessageFlag> = flags_doc
        .content
        .get("flags")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(MessageFlag::from_imap_string)
                .collect()
        })
        .unwrap_or_default();

    for (field, flag) in [
        ("seen", MessageFlag::Seen),
        ("recent", MessageFlag::Recent),
        ("deleted", MessageFlag::Deleted),
    ] {
        if flags_doc.get_bool(field).unwrap_or(false) && !flags.contains(&flag) {
            flags.push(flag);
        }
    }
    flags
}

fn stored_tags(flags_doc: &Document) -> TagSet {
    flags_doc
        .content
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Orchestrates mailbox, UID and document operations for stored mail
pub struct MailQuerier {
    docs: Arc<dyn DocumentStore>,
    uids: Arc<dyn UidIndexer>,
    assembler: MessageAssembler,
    /// Serializes UID assignment per mailbox
    mailbox_locks: LockTable<Uuid>,
    /// Serializes writes per mail ident, across mailboxes
    ident_locks: LockTable<MailId>,
    /// Serializes mailbox creation
    create_lock: tokio::sync::Mutex<()>,
}

impl MailQuerier {
    pub fn new(docs: Arc<dyn DocumentStore>, uids: Arc<dyn UidIndexer>) -> Self {
        let assembler = MessageAssembler::new(BodyDocumentIndex::new(Arc::clone(&docs)));

        Self {
            docs,
            uids,
            assembler,
            mailbox_locks: LockTable::new(),
            ident_locks: LockTable::new(),
            create_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.docs
    }

    // Guarded accessors

    /// Mailbox documents named `name`
    pub async fn get_mbox(&self, name: Option<&str>) -> Result<Vec<Document>> {
        match key(name) {
            Some(name) => {
                self.docs
                    .query_by_index(IndexName::ByTypeAndMailbox, &[DocType::Mailbox.as_str(), name])
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Flags documents of every mail in mailbox `name`
    pub async fn all_flags_by_mbox(&self, name: Option<&str>) -> Result<Vec<Document>> {
        match key(name) {
            Some(name) => {
                self.docs
                    .query_by_index(IndexName::ByTypeAndMailbox, &[DocType::Flags.as_str(), name])
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Flags documents of the mails in `name` still marked recent
    pub async fn recent_by_mbox(&self, name: Option<&str>) -> Result<Vec<Document>> {
        match key(name) {
            Some(name) => {
                self.docs
                    .query_by_index(
                        IndexName::ByTypeAndMailboxAndRecent,
                        &[DocType::Flags.as_str(), name, "1"],
                    )
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    pub async fn content_by_phash(&self, phash: Option<&str>) -> Result<Option<Document>> {
        self.first_by(IndexName::ByTypeAndPayloadHash, DocType::Content, phash)
            .await
    }

    pub async fn flags_by_chash(&self, chash: Option<&str>) -> Result<Option<Document>> {
        self.first_by(IndexName::ByTypeAndContentHash, DocType::Flags, chash)
            .await
    }

    pub async fn header_by_chash(&self, chash: Option<&str>) -> Result<Option<Document>> {
        self.first_by(IndexName::ByTypeAndContentHash, DocType::Head, chash)
            .await
    }

    /// Idents of the mails in mailbox `name`, in storage order
    pub async fn idents_by_mailbox(&self, name: Option<&str>) -> Result<Vec<MailId>> {
        Ok(self
            .all_flags_by_mbox(name)
            .await?
            .iter()
            .filter_map(|doc| doc.get_str("chash"))
            .map(MailId::from)
            .collect())
    }

    async fn first_by(
        &self,
        index: IndexName,
        doc_type: DocType,
        value: Option<&str>,
    ) -> Result<Option<Document>> {
        let value = match key(value) {
            Some(value) => value,
            None => return Ok(None),
        };
        Ok(self
            .docs
            .query_by_index(index, &[doc_type.as_str(), value])
            .await?
            .into_iter()
            .next())
    }

    // Mailboxes

    pub async fn mailbox(&self, name: &str) -> Result<Option<MailboxRecord>> {
        self.get_mbox(Some(name))
            .await?
            .first()
            .map(mailbox_record)
            .transpose()
    }

    pub async fn get_or_create_mailbox(&self, name: &str) -> Result<MailboxRecord> {
        if name.trim().is_empty() {
            return Err(Error::InvalidMailbox("Mailbox name is empty".to_string()));
        }

        let _guard = self.create_lock.lock().await;
        if let Some(existing) = self.mailbox(name).await? {
            return Ok(existing);
        }

        let uuid = Uuid::new_v4();
        self.docs
            .create_doc(json!({
                "type": DocType::Mailbox.as_str(),
                "mbox": name,
                "uuid": uuid.to_string(),
                "lastuid": 0,
            }))
            .await?;
        self.uids.ensure_table(uuid).await?;
        log::info!("Created mailbox {} ({})", name, uuid);

        Ok(MailboxRecord {
            name: name.to_string(),
            uuid,
            last_uid: 0,
        })
    }

    pub async fn mailbox_names(&self) -> Result<Vec<MailboxName>> {
        Ok(self
            .docs
            .query_by_index(IndexName::ByType, &[DocType::Mailbox.as_str()])
            .await?
            .iter()
            .filter_map(|doc| doc.get_str("mbox"))
            .map(str::to_string)
            .collect())
    }

    /// Last UID handed out in mailbox `name`, 0 when it does not exist
    pub async fn get_lastuid(&self, name: &str) -> Result<Uid> {
        match self.mailbox(name).await? {
            Some(mailbox) => {
                self.uids.ensure_table(mailbox.uuid).await?;
                self.uids.last_uid(mailbox.uuid).await
            }
            None => Ok(0),
        }
    }

    /// A mailbox is fresh until it has handed out its first UID
    pub async fn is_fresh(&self, name: &str) -> Result<bool> {
        Ok(self.get_lastuid(name).await? == 0)
    }

    /// Delete a mailbox together with the mails filed in it
    pub async fn delete_mailbox(&self, name: &str) -> Result<()> {
        let mbox_docs = self.get_mbox(Some(name)).await?;
        let record = match mbox_docs.first() {
            Some(doc) => mailbox_record(doc)?,
            None => return Err(Error::NotFound(format!("Mailbox {} not found", name))),
        };

        let _guard = self.mailbox_locks.lock(&record.uuid).await?;

        for ident in self.idents_by_mailbox(Some(name)).await? {
            // A concurrent remove may have got there first
            match self.delete_mail_documents(&ident).await {
                Ok(()) | Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.uids.drop_table(record.uuid).await?;
        for doc in mbox_docs {
            self.docs.delete_doc(&doc.id).await?;
        }

        log::info!("Deleted mailbox {}", name);
        Ok(())
    }

    /// Idents of the mails in mailbox `name`, in UID order
    pub async fn mailbox_mail_ids(&self, name: &str) -> Result<Vec<MailId>> {
        match self.mailbox(name).await? {
            Some(mailbox) => Ok(self
                .uids
                .uids(mailbox.uuid)
                .await?
                .into_iter()
                .map(|(_, chash)| MailId::from(chash))
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    // Mails

    /// Store `mail` in mailbox `name` under the next free UID
    ///
    /// The UID is reserved before any document is written, and the flags
    /// document that marks the mail as stored is written last. When a write
    /// fails the documents written so far are removed again, so retrying
    /// starts from a clean slate. The reserved UID is not handed out again.
    pub async fn create_mail(&self, mail: &dyn PersistableMail, name: &str) -> Result<StoredMail> {
        let mailbox = self.get_or_create_mailbox(name).await?;
        let ident = mail.ident();

        // Ident before mailbox; nothing takes them the other way round
        let _ident_guard = self.ident_locks.lock(&ident).await?;
        let _mailbox_guard = self.mailbox_locks.lock(&mailbox.uuid).await?;

        if self.flags_by_chash(Some(ident.as_str())).await?.is_some() {
            return Err(Error::AlreadyExists(format!("Mail {} is already stored", ident)));
        }

        self.uids.ensure_table(mailbox.uuid).await?;
        let uid = self.uids.last_uid(mailbox.uuid).await? + 1;
        self.uids.advance(mailbox.uuid, uid, ident.as_str()).await?;

        if let Err(e) = self.write_mail_documents(mail, uid, &mailbox).await {
            if let Err(cleanup) = self.uids.remove(mailbox.uuid, uid).await {
                log::error!("Failed to release UID {} in {}: {}", uid, name, cleanup);
            }
            return Err(e);
        }

        if let Err(e) = self.record_last_uid(name, uid).await {
            log::warn!("Mailbox {} last UID not recorded: {}", name, e);
        }
        log::debug!("Stored mail {} in {} as UID {}", ident, name, uid);

        self.mail(&ident, true)
            .await?
            .ok_or_else(|| Error::Internal(format!("Mail {} missing after save", ident)))
    }

    /// Write the documents of a new mail, flags last
    ///
    /// Content documents already stored under the same hash are reused.
    /// On failure the head and flags written here are deleted; content
    /// documents stay, they are shared by hash.
    async fn write_mail_documents(
        &self,
        mail: &dyn PersistableMail,
        uid: Uid,
        mailbox: &MailboxRecord,
    ) -> Result<()> {
        let doc_type = |doc: &Value| doc.get("type").and_then(Value::as_str).and_then(DocType::parse);
        let (flags, rest): (Vec<Value>, Vec<Value>) = mail
            .documents_for_save(uid, mailbox)
            .into_iter()
            .partition(|doc| doc_type(doc) == Some(DocType::Flags));

        let mut written = Vec::new();
        let mut result = Ok(());
        for doc in rest.into_iter().chain(flags) {
            let kind = doc_type(&doc);
            if kind == Some(DocType::Content) {
                let phash = doc.get("phash").and_then(Value::as_str);
                match self.content_by_phash(phash).await {
                    Ok(Some(_)) => continue,
                    Ok(None) => {}
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
            match self.docs.create_doc(doc).await {
                Ok(created) if kind != Some(DocType::Content) => written.push(created.id),
                Ok(_) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        if result.is_err() {
            for id in written.iter().rev() {
                if let Err(e) = self.docs.delete_doc(id).await {
                    log::error!("Failed to remove partial mail document {}: {}", id, e);
                }
            }
        }
        result
    }

    async fn record_last_uid(&self, name: &str, uid: Uid) -> Result<()> {
        if let Some(mut doc) = self.get_mbox(Some(name)).await?.into_iter().next() {
            doc.set("lastuid", json!(uid));
            self.docs.put_doc(&doc).await?;
        }
        Ok(())
    }

    /// Rebuild a stored mail; the body is assembled only when asked for
    pub async fn mail(&self, ident: &MailId, include_body: bool) -> Result<Option<StoredMail>> {
        let flags = match self.flags_by_chash(Some(ident.as_str())).await? {
            Some(flags) => flags,
            None => return Ok(None),
        };
        let head = match self.header_by_chash(Some(ident.as_str())).await? {
            Some(head) => head,
            None => {
                log::warn!("Mail {} has flags but no head document", ident);
                return Ok(None);
            }
        };
        let descriptor = HeadDescriptor::from_document(&head)?;

        let body = if include_body {
            Some(self.extract_parts(&descriptor).await?)
        } else {
            None
        };

        Ok(Some(StoredMail {
            ident: ident.clone(),
            mailbox: flags.get_str("mbox").unwrap_or_default().to_string(),
            uid: uid_field(&flags, "uid")?.unwrap_or(0),
            headers: descriptor.headers,
            tags: stored_tags(&flags),
            flags: stored_flags(&flags),
            date: head
                .get_str("date")
                .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
                .map(|date| date.with_timezone(&Utc)),
            body,
        }))
    }

    pub async fn mails(&self, idents: &[MailId]) -> Result<Vec<StoredMail>> {
        let results = join_all(idents.iter().map(|ident| self.mail(ident, true))).await;

        let mut mails = Vec::with_capacity(results.len());
        for mail in results {
            if let Some(mail) = mail? {
                mails.push(mail);
            }
        }
        Ok(mails)
    }

    pub async fn all_mails(&self) -> Result<Vec<StoredMail>> {
        let idents: Vec<MailId> = self
            .docs
            .query_by_index(IndexName::ByType, &[DocType::Flags.as_str()])
            .await?
            .iter()
            .filter_map(|doc| doc.get_str("chash"))
            .map(MailId::from)
            .collect();
        self.mails(&idents).await
    }

    pub async fn extract_parts(&self, head: &HeadDescriptor) -> Result<ReconstructedMessage> {
        self.assembler.assemble(head).await
    }

    pub async fn attachment(
        &self,
        phash: &str,
        encoding: Option<&str>,
    ) -> Result<Option<AttachmentContent>> {
        self.assembler.attachment(phash, encoding).await
    }

    /// Write tags and flags of `mail` back to its flags document
    ///
    /// Marking a mail seen clears its recent state.
    pub async fn update_mail(&self, mail: &StoredMail) -> Result<()> {
        let mut doc = self
            .flags_by_chash(Some(mail.ident.as_str()))
            .await?
            .ok_or_else(|| Error::NotFound(format!("Mail {} not found", mail.ident)))?;

        let seen = mail.flags.contains(&MessageFlag::Seen);
        let recent = !seen && doc.get_bool("recent").unwrap_or(false);
        let flags: Vec<String> = mail
            .flags
            .iter()
            .filter(|flag| **flag != MessageFlag::Recent)
            .map(MessageFlag::to_imap_string)
            .collect();

        doc.set("tags", json!(mail.tags.to_vec()));
        doc.set("flags", json!(flags));
        doc.set("seen", json!(seen));
        doc.set("recent", json!(recent));
        doc.set("deleted", json!(mail.flags.contains(&MessageFlag::Deleted)));
        self.docs.put_doc(&doc).await
    }

    /// Remove a mail's flags and head documents and release its UID
    ///
    /// Body documents are shared by hash and stay in place.
    pub async fn remove_mail(&self, ident: &MailId) -> Result<()> {
        let _guard = self.ident_locks.lock(ident).await?;
        self.delete_mail_documents(ident).await
    }

    async fn delete_mail_documents(&self, ident: &MailId) -> Result<()> {
        let flags = self
            .flags_by_chash(Some(ident.as_str()))
            .await?
            .ok_or_else(|| Error::NotFound(format!("Mail {} not found", ident)))?;

        // Flags go first: without them the mail no longer exists
        self.docs.delete_doc(&flags.id).await?;
        if let Some(head) = self.header_by_chash(Some(ident.as_str())).await? {
            self.docs.delete_doc(&head.id).await?;
        }

        let uid = uid_field(&flags, "uid")?;
        if let (Some(uuid), Some(uid)) = (flags.get_str("mbox_uuid"), uid) {
            match Uuid::parse_str(uuid) {
                Ok(uuid) => self.uids.remove(uuid, uid).await?,
                Err(e) => log::warn!("Mail {} has a malformed mailbox uuid: {}", ident, e),
            }
        }
        Ok(())
    }
}
