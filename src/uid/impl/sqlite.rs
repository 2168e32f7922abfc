//! SQLite-based UID indexer implementation

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Uid;
use crate::uid::UidIndexer;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS mailbox_counters (
    mailbox TEXT PRIMARY KEY,
    last_uid INTEGER NOT NULL DEFAULT 0
);";

/// One `uid_<uuid>` table per mailbox plus a shared counter table
pub struct SqliteUidIndexer {
    conn: Arc<Mutex<Connection>>,
}

/// Table name for a mailbox; the simple UUID form is a safe identifier
fn table_name(mailbox: Uuid) -> String {
    format!("uid_{}", mailbox.simple())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn read_last_uid(conn: &Connection, mailbox: Uuid) -> Result<Option<Uid>> {
    let last = conn
        .query_row(
            "SELECT last_uid FROM mailbox_counters WHERE mailbox = ?1",
            params![mailbox.to_string()],
            |row| row.get::<_, Uid>(0),
        )
        .optional()?;
    Ok(last)
}

impl SqliteUidIndexer {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            Ok::<Connection, Error>(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(|| {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA)?;
            Ok::<Connection, Error>(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| Error::Database("Connection lock poisoned".to_string()))?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl UidIndexer for SqliteUidIndexer {
    async fn ensure_table(&self, mailbox: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (uid INTEGER PRIMARY KEY, chash TEXT NOT NULL)",
                table_name(mailbox)
            ))?;
            tx.execute(
                "INSERT OR IGNORE INTO mailbox_counters (mailbox, last_uid) VALUES (?1, 0)",
                params![mailbox.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn last_uid(&self, mailbox: Uuid) -> Result<Uid> {
        self.with_conn(move |conn| Ok(read_last_uid(conn, mailbox)?.unwrap_or(0)))
            .await
    }

    async fn advance(&self, mailbox: Uuid, uid: Uid, chash: &str) -> Result<()> {
        let chash = chash.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let last = read_last_uid(&tx, mailbox)?.ok_or_else(|| {
                Error::NotFound(format!("No UID table for mailbox {}", mailbox))
            })?;

            if uid <= last {
                return Err(Error::InvalidState(format!(
                    "UID {} is not above last UID {}",
                    uid, last
                )));
            }

            tx.execute(
                &format!(
                    "INSERT INTO {} (uid, chash) VALUES (?1, ?2)",
                    table_name(mailbox)
                ),
                params![uid, chash],
            )?;
            tx.execute(
                "UPDATE mailbox_counters SET last_uid = ?2 WHERE mailbox = ?1",
                params![mailbox.to_string(), uid],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, mailbox: Uuid, uid: Uid) -> Result<()> {
        self.with_conn(move |conn| {
            let table = table_name(mailbox);
            if table_exists(conn, &table)? {
                conn.execute(&format!("DELETE FROM {} WHERE uid = ?1", table), params![uid])?;
            }
            Ok(())
        })
        .await
    }

    async fn uids(&self, mailbox: Uuid) -> Result<Vec<(Uid, String)>> {
        self.with_conn(move |conn| {
            let table = table_name(mailbox);
            if !table_exists(conn, &table)? {
                return Ok(Vec::new());
            }

            let mut stmt = conn.prepare(&format!("SELECT uid, chash FROM {} ORDER BY uid", table))?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, Uid>(0)?, row.get::<_, String>(1)?)))?;

            let mut uids = Vec::new();
            for row in rows {
                uids.push(row?);
            }
            Ok(uids)
        })
        .await
    }

    async fn drop_table(&self, mailbox: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", table_name(mailbox)))?;
            tx.execute(
                "DELETE FROM mailbox_counters WHERE mailbox = ?1",
                params![mailbox.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_advance_and_read_back() {
        let indexer = SqliteUidIndexer::in_memory().await.unwrap();
        let mailbox = Uuid::new_v4();
        indexer.ensure_table(mailbox).await.unwrap();

        assert_eq!(indexer.last_uid(mailbox).await.unwrap(), 0);
        indexer.advance(mailbox, 1, "a").await.unwrap();
        indexer.advance(mailbox, 3, "b").await.unwrap();

        assert_eq!(indexer.last_uid(mailbox).await.unwrap(), 3);
        assert_eq!(
            indexer.uids(mailbox).await.unwrap(),
            vec![(1, "a".to_string()), (3, "b".to_string())]
        );
    }

    #[tokio::test]
    async fn test_rejects_stale_uid() {
        let indexer = SqliteUidIndexer::in_memory().await.unwrap();
        let mailbox = Uuid::new_v4();
        indexer.ensure_table(mailbox).await.unwrap();
        indexer.advance(mailbox, 5, "a").await.unwrap();

        assert!(matches!(
            indexer.advance(mailbox, 4, "b").await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_advance_without_table() {
        let indexer = SqliteUidIndexer::in_memory().await.unwrap();
        assert!(matches!(
            indexer.advance(Uuid::new_v4(), 1, "a").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_counter_survives_remove_and_reopen() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("uids.db");
        let mailbox = Uuid::new_v4();

        {
            let indexer = SqliteUidIndexer::new(&path).await.unwrap();
            indexer.ensure_table(mailbox).await.unwrap();
            indexer.advance(mailbox, 1, "a").await.unwrap();
            indexer.advance(mailbox, 2, "b").await.unwrap();
            indexer.remove(mailbox, 2).await.unwrap();
        }

        let indexer = SqliteUidIndexer::new(&path).await.unwrap();
        assert_eq!(indexer.last_uid(mailbox).await.unwrap(), 2);
        assert_eq!(indexer.uids(mailbox).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drop_table() {
        let indexer = SqliteUidIndexer::in_memory().await.unwrap();
        let mailbox = Uuid::new_v4();
        indexer.ensure_table(mailbox).await.unwrap();
        indexer.advance(mailbox, 1, "a").await.unwrap();

        indexer.drop_table(mailbox).await.unwrap();

        assert_eq!(indexer.last_uid(mailbox).await.unwrap(), 0);
        assert!(indexer.uids(mailbox).await.unwrap().is_empty());
    }
}
