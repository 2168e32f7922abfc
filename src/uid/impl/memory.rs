//! In-memory UID indexer implementation

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Uid;
use crate::uid::UidIndexer;

#[derive(Default)]
struct UidTable {
    last_uid: Uid,
    uids: BTreeMap<Uid, String>,
}

/// UID indexer held entirely in memory
pub struct InMemoryUidIndexer {
    tables: RwLock<HashMap<Uuid, UidTable>>,
}

impl InMemoryUidIndexer {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryUidIndexer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UidIndexer for InMemoryUidIndexer {
    async fn ensure_table(&self, mailbox: Uuid) -> Result<()> {
        self.tables.write().await.entry(mailbox).or_default();
        Ok(())
    }

    async fn last_uid(&self, mailbox: Uuid) -> Result<Uid> {
        Ok(self
            .tables
            .read()
            .await
            .get(&mailbox)
            .map(|table| table.last_uid)
            .unwrap_or(0))
    }

    async fn advance(&self, mailbox: Uuid, uid: Uid, chash: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&mailbox)
            .ok_or_else(|| Error::NotFound(format!("No UID table for mailbox {}", mailbox)))?;

        if uid <= table.last_uid {
            return Err(Error::InvalidState(format!(
                "UID {} is not above last UID {}",
                uid, table.last_uid
            )));
        }

        table.last_uid = uid;
        table.uids.insert(uid, chash.to_string());
        Ok(())
    }

    async fn remove(&self, mailbox: Uuid, uid: Uid) -> Result<()> {
        if let Some(table) = self.tables.write().await.get_mut(&mailbox) {
            table.uids.remove(&uid);
        }
        Ok(())
    }

    async fn uids(&self, mailbox: Uuid) -> Result<Vec<(Uid, String)>> {
        Ok(self
            .tables
            .read()
            .await
            .get(&mailbox)
            .map(|table| {
                table
                    .uids
                    .iter()
                    .map(|(uid, chash)| (*uid, chash.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn drop_table(&self, mailbox: Uuid) -> Result<()> {
        self.tables.write().await.remove(&mailbox);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_mailbox_starts_at_zero() {
        let indexer = InMemoryUidIndexer::new();
        assert_eq!(indexer.last_uid(Uuid::new_v4()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_advance_is_strictly_increasing() {
        let indexer = InMemoryUidIndexer::new();
        let mailbox = Uuid::new_v4();
        indexer.ensure_table(mailbox).await.unwrap();

        indexer.advance(mailbox, 1, "a").await.unwrap();
        indexer.advance(mailbox, 2, "b").await.unwrap();

        assert!(matches!(
            indexer.advance(mailbox, 2, "c").await,
            Err(Error::InvalidState(_))
        ));
        assert_eq!(indexer.last_uid(mailbox).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_remove_keeps_counter() {
        let indexer = InMemoryUidIndexer::new();
        let mailbox = Uuid::new_v4();
        indexer.ensure_table(mailbox).await.unwrap();
        indexer.advance(mailbox, 1, "a").await.unwrap();
        indexer.advance(mailbox, 2, "b").await.unwrap();

        indexer.remove(mailbox, 2).await.unwrap();

        assert_eq!(indexer.last_uid(mailbox).await.unwrap(), 2);
        assert_eq!(indexer.uids(mailbox).await.unwrap(), vec![(1, "a".to_string())]);
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let indexer = InMemoryUidIndexer::new();
        let mailbox = Uuid::new_v4();
        indexer.ensure_table(mailbox).await.unwrap();
        indexer.advance(mailbox, 1, "a").await.unwrap();
        indexer.ensure_table(mailbox).await.unwrap();

        assert_eq!(indexer.last_uid(mailbox).await.unwrap(), 1);
    }
}
