//! UidIndexer trait and implementations
//!
//! The UID indexer hands out mailbox-local message UIDs. Counters are keyed
//! by the mailbox UUID rather than its name, so a rename keeps the counter.
//! A UID, once handed out, is never handed out again for the same mailbox,
//! even after the mail it named is removed.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::Uid;

pub mod r#impl;

/// Trait for per-mailbox UID bookkeeping
///
/// Implementations do not serialize "read last, then advance" sequences on
/// their own; callers hold a per-mailbox lock around them.
#[async_trait]
pub trait UidIndexer: Send + Sync {
    /// Prepare storage for a mailbox (idempotent)
    async fn ensure_table(&self, mailbox: Uuid) -> Result<()>;

    /// Highest UID assigned so far, 0 when none or the mailbox is unknown
    async fn last_uid(&self, mailbox: Uuid) -> Result<Uid>;

    /// Record `uid` as assigned to the mail with content hash `chash`
    ///
    /// Fails with `InvalidState` unless `uid` is greater than the last UID.
    async fn advance(&self, mailbox: Uuid, uid: Uid, chash: &str) -> Result<()>;

    /// Forget the UID of a removed mail (the counter is not lowered)
    async fn remove(&self, mailbox: Uuid, uid: Uid) -> Result<()>;

    /// Assigned UIDs still in use, ascending, with their content hashes
    async fn uids(&self, mailbox: Uuid) -> Result<Vec<(Uid, String)>>;

    /// Drop all bookkeeping for a deleted mailbox
    async fn drop_table(&self, mailbox: Uuid) -> Result<()>;
}
