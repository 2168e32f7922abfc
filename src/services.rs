//! Wiring of the mail store components

use std::sync::Arc;

use crate::config::{Config, SearchBackend, StorageBackend};
use crate::docstore::r#impl::{InMemoryDocumentStore, SqliteDocumentStore};
use crate::docstore::DocumentStore;
use crate::error::Result;
use crate::mailstore::r#impl::DocumentMailStore;
use crate::mailstore::{MailStore, SearchableMailStore};
use crate::querier::MailQuerier;
use crate::search::r#impl::{InMemorySearchEngine, TantivySearchEngine};
use crate::search::SearchEngine;
use crate::tags::TagService;
use crate::uid::r#impl::{InMemoryUidIndexer, SqliteUidIndexer};
use crate::uid::UidIndexer;

/// Everything a client of the mail store needs, wired together
pub struct Services {
    pub documents: Arc<dyn DocumentStore>,
    pub querier: Arc<MailQuerier>,
    pub search_engine: Arc<dyn SearchEngine>,
    /// Document-backed store behind the search index layer
    pub mail_store: Arc<dyn MailStore>,
    pub tags: TagService,
}

impl Services {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        uids: Arc<dyn UidIndexer>,
        search_engine: Arc<dyn SearchEngine>,
    ) -> Self {
        let querier = Arc::new(MailQuerier::new(Arc::clone(&documents), uids));
        let mail_store: Arc<dyn MailStore> = Arc::new(SearchableMailStore::new(
            DocumentMailStore::new(Arc::clone(&querier)),
            Arc::clone(&search_engine),
        ));
        let tags = TagService::new(Arc::clone(&mail_store), Arc::clone(&search_engine));

        Self {
            documents,
            querier,
            search_engine,
            mail_store,
            tags,
        }
    }

    /// All-in-memory services, for testing
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryUidIndexer::new()),
            Arc::new(InMemorySearchEngine::new()),
        )
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let (documents, uids): (Arc<dyn DocumentStore>, Arc<dyn UidIndexer>) =
            match config.storage.backend {
                StorageBackend::Memory => (
                    Arc::new(InMemoryDocumentStore::new()),
                    Arc::new(InMemoryUidIndexer::new()),
                ),
                StorageBackend::Sqlite => {
                    tokio::fs::create_dir_all(&config.storage.data_dir).await?;
                    (
                        Arc::new(SqliteDocumentStore::new(config.documents_path()).await?),
                        Arc::new(SqliteUidIndexer::new(config.uids_path()).await?),
                    )
                }
            };

        let search_engine: Arc<dyn SearchEngine> = match config.search.backend {
            SearchBackend::Memory => Arc::new(InMemorySearchEngine::new()),
            SearchBackend::Tantivy => Arc::new(TantivySearchEngine::new(
                config.index_dir(),
                config.search.writer_heap_bytes,
            )?),
        };

        log::info!(
            "Storage backend {:?}, search backend {:?}",
            config.storage.backend,
            config.search.backend
        );
        Ok(Self::new(documents, uids, search_engine))
    }
}
