//! Bulk maintenance commands

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::docstore::DocumentStore;
use crate::error::{Error, Result};
use crate::mailstore::MailStore;
use crate::search::{SearchEngine, SearchQuery};
use crate::types::MailId;

/// Mailbox bulk-loaded mail is filed into
pub const LOAD_MAILBOX: &str = "INBOX";

const MAILDIR_SUBDIRS: [&str; 2] = ["new", "cur"];

/// Delete every mail document, leaving mailbox documents in place
///
/// Returns the number of documents deleted.
pub async fn delete_all_mails(docs: &dyn DocumentStore) -> Result<usize> {
    let mut deleted = 0;
    for doc in docs.all_docs().await? {
        if doc.doc_type().is_some_and(|t| t.is_mail_document()) {
            docs.delete_doc(&doc.id).await?;
            deleted += 1;
        }
    }
    log::info!("Deleted {} mail documents", deleted);
    Ok(deleted)
}

/// Files of one maildir subdirectory, sorted by name
async fn maildir_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No {} directory, skipping", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Add every mail found under the maildir `roots` to the INBOX
///
/// Nothing is touched when `roots` is empty. Mails already stored are
/// skipped. Returns the number of mails added.
pub async fn load_mails(store: &dyn MailStore, roots: &[PathBuf]) -> Result<usize> {
    if roots.is_empty() {
        return Ok(0);
    }

    store.add_mailbox(LOAD_MAILBOX).await?;

    let mut added = 0;
    for root in roots {
        for subdir in MAILDIR_SUBDIRS {
            for path in maildir_files(&root.join(subdir)).await? {
                let raw = tokio::fs::read(&path).await?;
                match store.add_mail(LOAD_MAILBOX, &raw).await {
                    Ok(_) => added += 1,
                    Err(Error::AlreadyExists(msg)) => {
                        log::warn!("Skipping {}: {}", path.display(), msg)
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    log::info!("Loaded {} mails into {}", added, LOAD_MAILBOX);
    Ok(added)
}

/// Index every stored mail again
///
/// Index entries for mails the store no longer holds are removed first.
pub async fn reindex(store: &dyn MailStore, engine: &dyn SearchEngine) -> Result<usize> {
    let mails = store.all_mails().await?;
    let live: HashSet<&MailId> = mails.iter().map(|mail| &mail.ident).collect();

    let mut pruned = 0;
    for id in engine.search(&SearchQuery::All).await? {
        if !live.contains(&id) {
            engine.remove_from_index(&id).await?;
            pruned += 1;
        }
    }
    if pruned > 0 {
        log::info!("Removed {} stale index entries", pruned);
    }

    for mail in &mails {
        engine.index_mail(mail).await?;
    }
    log::info!("Reindexed {} mails", mails.len());
    Ok(mails.len())
}
