//! In-memory document store implementation

use async_trait::async_trait;
use futures::channel::oneshot;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::docstore::{DocId, Document, DocumentStore, IndexName};
use crate::error::{Error, Result};

/// Write commands for the document store (only writes go through the channel)
enum WriteCommand {
    Create(Value, oneshot::Sender<Result<Document>>),
    Put(Document, oneshot::Sender<Result<()>>),
    Delete(DocId, oneshot::Sender<Result<()>>),
}

/// Documents kept in insertion order
struct StoreState {
    /// Insertion sequence number to document
    docs: BTreeMap<u64, Document>,
    /// Document ID to insertion sequence number
    ids: HashMap<DocId, u64>,
    next_seq: u64,
}

impl StoreState {
    fn new() -> Self {
        Self {
            docs: BTreeMap::new(),
            ids: HashMap::new(),
            next_seq: 0,
        }
    }

    fn create(&mut self, content: Value) -> Result<Document> {
        if !content.is_object() {
            return Err(Error::Serialization(
                "Document content must be a JSON object".to_string(),
            ));
        }

        let doc = Document::new(Uuid::new_v4().simple().to_string(), content);
        let seq = self.next_seq;
        self.next_seq += 1;

        self.ids.insert(doc.id.clone(), seq);
        self.docs.insert(seq, doc.clone());
        Ok(doc)
    }

    fn put(&mut self, doc: Document) -> Result<()> {
        match self.ids.get(&doc.id) {
            Some(seq) => {
                self.docs.insert(*seq, doc);
                Ok(())
            }
            None => Err(Error::NotFound(format!("Document {} not found", doc.id))),
        }
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        match self.ids.remove(id) {
            Some(seq) => {
                self.docs.remove(&seq);
                Ok(())
            }
            None => Err(Error::NotFound(format!("Document {} not found", id))),
        }
    }
}

/// Document store held entirely in memory
///
/// Writes are serialized through a writer loop; reads take the shared lock
/// directly.
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<StoreState>>,
    write_tx: Sender<WriteCommand>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        let (write_tx, write_rx) = channel(100);
        let state = Arc::new(RwLock::new(StoreState::new()));

        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            Self::writer_loop(state_clone, write_rx).await;
        });

        Self { state, write_tx }
    }

    async fn writer_loop(state: Arc<RwLock<StoreState>>, mut rx: Receiver<WriteCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                WriteCommand::Create(content, reply) => {
                    let mut state = state.write().await;
                    let _ = reply.send(state.create(content));
                }
                WriteCommand::Put(doc, reply) => {
                    let mut state = state.write().await;
                    let _ = reply.send(state.put(doc));
                }
                WriteCommand::Delete(id, reply) => {
                    let mut state = state.write().await;
                    let _ = reply.send(state.delete(&id));
                }
            }
        }
    }

    async fn send<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> WriteCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.write_tx
            .send(make(tx))
            .await
            .map_err(|_| Error::Internal("Writer loop stopped".to_string()))?;
        rx.await
            .map_err(|_| Error::Internal("Writer loop dropped reply".to_string()))?
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query_by_index(&self, index: IndexName, keys: &[&str]) -> Result<Vec<Document>> {
        index.check_keys(keys)?;
        let state = self.state.read().await;
        Ok(state
            .docs
            .values()
            .filter(|doc| index.matches(&doc.content, keys))
            .cloned()
            .collect())
    }

    async fn get_doc(&self, id: &str) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state
            .ids
            .get(id)
            .and_then(|seq| state.docs.get(seq))
            .cloned())
    }

    async fn create_doc(&self, content: Value) -> Result<Document> {
        self.send(|reply| WriteCommand::Create(content, reply)).await
    }

    async fn put_doc(&self, doc: &Document) -> Result<()> {
        let doc = doc.clone();
        self.send(|reply| WriteCommand::Put(doc, reply)).await
    }

    async fn delete_doc(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.send(|reply| WriteCommand::Delete(id, reply)).await
    }

    async fn all_docs(&self) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        Ok(state.docs.values().cloned().collect())
    }
}
