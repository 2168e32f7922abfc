//! Tag normalization and assignment

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::mailstore::MailStore;
use crate::search::SearchEngine;
use crate::types::{MailId, StoredMail, TagSet};

/// Tags owned by the system; users cannot assign them
pub const SPECIAL_TAGS: [&str; 4] = ["inbox", "sent", "drafts", "trash"];

pub fn is_special_tag(tag: &str) -> bool {
    SPECIAL_TAGS.iter().any(|special| special.eq_ignore_ascii_case(tag))
}

/// Assigns user tags to stored mails
///
/// Updates go through the mail store, so a searchable store re-indexes the
/// mail on save.
pub struct TagService {
    mail_store: Arc<dyn MailStore>,
    search_engine: Arc<dyn SearchEngine>,
}

impl TagService {
    pub fn new(mail_store: Arc<dyn MailStore>, search_engine: Arc<dyn SearchEngine>) -> Self {
        Self {
            mail_store,
            search_engine,
        }
    }

    /// Normalize requested tags against the tags already in use
    ///
    /// Tags are trimmed and blank ones dropped. A tag matching a known tag
    /// case-insensitively takes the known casing.
    pub async fn normalize(&self, requested: &[String]) -> Result<TagSet> {
        let known = self.search_engine.tags().await?;
        let mut tags = TagSet::new();

        for tag in requested.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if is_special_tag(tag) {
                return Err(Error::InvalidTag(format!(
                    "None of the following words can be used as tags: {}",
                    tag.to_lowercase()
                )));
            }
            let tag = known
                .iter()
                .find(|k| k.to_lowercase() == tag.to_lowercase())
                .map(String::as_str)
                .unwrap_or(tag);
            tags.insert(tag);
        }
        Ok(tags)
    }

    /// Replace the user tags of mail `ident`
    pub async fn update_tags(&self, ident: &MailId, requested: &[String]) -> Result<StoredMail> {
        let tags = self.normalize(requested).await?;
        let mut mail = self
            .mail_store
            .get_mail(ident, true)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Mail {} not found", ident)))?;

        mail.tags = tags;
        self.mail_store.update_mail(&mail).await?;
        log::debug!("Tagged {} with {:?}", ident, mail.tags.to_vec());
        Ok(mail)
    }
}
