//! SQLite-based document store implementation

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::docstore::{index_key, Document, DocumentStore, IndexName};
use crate::error::{Error, Result};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    doc_type TEXT,
    phash TEXT,
    chash TEXT,
    mbox TEXT,
    recent TEXT,
    content TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS documents_by_type ON documents (doc_type);
CREATE INDEX IF NOT EXISTS documents_by_phash ON documents (doc_type, phash);
CREATE INDEX IF NOT EXISTS documents_by_chash ON documents (doc_type, chash);
CREATE INDEX IF NOT EXISTS documents_by_mbox ON documents (doc_type, mbox, recent);";

/// Document fields copied into key columns, with their column names
const KEY_COLUMNS: [(&str, &str); 5] = [
    ("type", "doc_type"),
    ("phash", "phash"),
    ("chash", "chash"),
    ("mbox", "mbox"),
    ("recent", "recent"),
];

/// Document store persisted as JSON rows in SQLite
///
/// Every field an index is built on is also stored in its own column, in
/// index-key form, so index queries run entirely in SQL.
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Open (or create) a store at the given path
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

    /// Create an in-memory store for testing
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
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::Database("Connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await?
    }
}

fn row_to_document(id: String, content: String) -> Result<Document> {
    Ok(Document::new(id, serde_json::from_str(&content)?))
}

fn column_for(field: &str) -> Result<&'static str> {
    KEY_COLUMNS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, column)| *column)
        .ok_or_else(|| Error::Index(format!("Field {} has no key column", field)))
}

/// Key column values of a document, in `KEY_COLUMNS` order
fn key_values(content: &Value) -> Vec<Option<String>> {
    KEY_COLUMNS
        .iter()
        .map(|(field, _)| index_key(content.get(*field)))
        .collect()
}

/// `WHERE` clause selecting the documents listed under an index key
fn index_filter(index: IndexName) -> Result<String> {
    let terms = index
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| Ok(format!("{} = ?{}", column_for(field)?, i + 1)))
        .collect::<Result<Vec<_>>>()?;
    Ok(terms.join(" AND "))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn query_by_index(&self, index: IndexName, keys: &[&str]) -> Result<Vec<Document>> {
        index.check_keys(keys)?;
        let sql = format!(
            "SELECT id, content FROM documents WHERE {} ORDER BY seq",
            index_filter(index)?
        );
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(keys.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut docs = Vec::new();
            for row in rows {
                let (id, content) = row?;
                docs.push(row_to_document(id, content)?);
            }
            Ok(docs)
        })
        .await
    }

    async fn get_doc(&self, id: &str) -> Result<Option<Document>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, content FROM documents WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;
            row.map(|(id, content)| row_to_document(id, content))
                .transpose()
        })
        .await
    }

    async fn create_doc(&self, content: Value) -> Result<Document> {
        if !content.is_object() {
            return Err(Error::Serialization(
                "Document content must be a JSON object".to_string(),
            ));
        }

        self.with_conn(move |conn| {
            let doc = Document::new(Uuid::new_v4().simple().to_string(), content);
            let keys = key_values(&doc.content);
            conn.execute(
                "INSERT INTO documents (id, doc_type, phash, chash, mbox, recent, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    doc.id,
                    keys[0],
                    keys[1],
                    keys[2],
                    keys[3],
                    keys[4],
                    doc.content.to_string()
                ],
            )?;
            Ok(doc)
        })
        .await
    }

    async fn put_doc(&self, doc: &Document) -> Result<()> {
        let doc = doc.clone();
        self.with_conn(move |conn| {
            let keys = key_values(&doc.content);
            let changed = conn.execute(
                "UPDATE documents
                 SET doc_type = ?2, phash = ?3, chash = ?4, mbox = ?5, recent = ?6, content = ?7
                 WHERE id = ?1",
                params![
                    doc.id,
                    keys[0],
                    keys[1],
                    keys[2],
                    keys[3],
                    keys[4],
                    doc.content.to_string()
                ],
            )?;
            if changed == 0 {
                return Err(Error::NotFound(format!("Document {} not found", doc.id)));
            }
            Ok(())
        })
        .await
    }

    async fn delete_doc(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(Error::NotFound(format!("Document {} not found", id)));
            }
            Ok(())
        })
        .await
    }

    async fn all_docs(&self) -> Result<Vec<Document>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, content FROM documents ORDER BY seq")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut docs = Vec::new();
            for row in rows {
                let (id, content) = row?;
                docs.push(row_to_document(id, content)?);
            }
            Ok(docs)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_query_by_index() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        store
            .create_doc(json!({"type": "mbx", "mbox": "INBOX", "uuid": "u1"}))
            .await
            .unwrap();
        store
            .create_doc(json!({"type": "mbx", "mbox": "Sent", "uuid": "u2"}))
            .await
            .unwrap();
        store
            .create_doc(json!({"type": "flags", "mbox": "INBOX"}))
            .await
            .unwrap();

        let docs = store
            .query_by_index(IndexName::ByTypeAndMailbox, &["mbx", "INBOX"])
            .await
            .unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_str("uuid"), Some("u1"));
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("docs.db");

        let id = {
            let store = SqliteDocumentStore::new(&path).await.unwrap();
            store
                .create_doc(json!({"type": "cnt", "phash": "H1", "raw": "hello"}))
                .await
                .unwrap()
                .id
        };

        let store = SqliteDocumentStore::new(&path).await.unwrap();
        let doc = store.get_doc(&id).await.unwrap().unwrap();
        assert_eq!(doc.get_str("raw"), Some("hello"));
    }

    #[tokio::test]
    async fn test_put_and_delete() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        let mut doc = store
            .create_doc(json!({"type": "flags", "mbox": "INBOX", "recent": true}))
            .await
            .unwrap();
        let recent = store
            .query_by_index(IndexName::ByTypeAndMailboxAndRecent, &["flags", "INBOX", "1"])
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);

        doc.set("recent", json!(false));
        store.put_doc(&doc).await.unwrap();
        let recent = store
            .query_by_index(IndexName::ByTypeAndMailboxAndRecent, &["flags", "INBOX", "1"])
            .await
            .unwrap();
        assert!(recent.is_empty());

        store.delete_doc(&doc.id).await.unwrap();
        assert!(store.get_doc(&doc.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_doc(&doc.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_matches_only_requested_hash() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        for (phash, chash) in [("H1", "C1"), ("H2", "C1"), ("H1", "C2")] {
            store
                .create_doc(json!({"type": "cnt", "phash": phash, "chash": chash}))
                .await
                .unwrap();
        }
        store
            .create_doc(json!({"type": "head", "chash": "C1"}))
            .await
            .unwrap();

        let by_phash = store
            .query_by_index(IndexName::ByTypeAndPayloadHash, &["cnt", "H1"])
            .await
            .unwrap();
        assert_eq!(by_phash.len(), 2);
        assert!(by_phash.iter().all(|doc| doc.get_str("phash") == Some("H1")));

        let by_chash = store
            .query_by_index(IndexName::ByTypeAndContentHash, &["head", "C1"])
            .await
            .unwrap();
        assert_eq!(by_chash.len(), 1);

        assert!(store
            .query_by_index(IndexName::ByTypeAndPayloadHash, &["cnt", "H3"])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_put_moves_document_between_keys() {
        let store = SqliteDocumentStore::in_memory().await.unwrap();
        let mut doc = store
            .create_doc(json!({"type": "flags", "mbox": "INBOX", "chash": "C1"}))
            .await
            .unwrap();

        doc.set("mbox", json!("Archive"));
        store.put_doc(&doc).await.unwrap();

        assert!(store
            .query_by_index(IndexName::ByTypeAndMailbox, &["flags", "INBOX"])
            .await
            .unwrap()
            .is_empty());
        let moved = store
            .query_by_index(IndexName::ByTypeAndMailbox, &["flags", "Archive"])
            .await
            .unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].id, doc.id);
    }

    #[test]
    fn test_every_index_field_has_a_column() {
        for index in [
            IndexName::ByType,
            IndexName::ByTypeAndPayloadHash,
            IndexName::ByTypeAndContentHash,
            IndexName::ByTypeAndMailbox,
            IndexName::ByTypeAndMailboxAndRecent,
        ] {
            assert!(index_filter(index).is_ok(), "{}", index);
        }
        assert_eq!(
            index_filter(IndexName::ByTypeAndMailboxAndRecent).unwrap(),
            "doc_type = ?1 AND mbox = ?2 AND recent = ?3"
        );
    }
}
