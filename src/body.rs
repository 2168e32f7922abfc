//! Lookup of body documents by payload hash

use std::sync::Arc;

use crate::docstore::{DocId, Document, DocumentStore, IndexName, DocType};
use crate::error::Result;

/// One stored MIME part body, addressed by its payload hash
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDocument {
    pub doc_id: DocId,
    pub phash: String,
    /// Transfer-encoded bytes as stored
    pub raw: String,
    pub content_type: Option<String>,
    pub transfer_encoding: Option<String>,
    pub disposition: Option<String>,
}

impl BodyDocument {
    fn from_document(doc: Document, phash: &str) -> Self {
        let field = |key: &str| {
            doc.get_str(key)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Self {
            phash: phash.to_string(),
            raw: doc.get_str("raw").unwrap_or_default().to_string(),
            content_type: field("content-type"),
            transfer_encoding: field("content-transfer-encoding"),
            disposition: field("content-disposition"),
            doc_id: doc.id,
        }
    }
}

/// Read-only index of body documents
#[derive(Clone)]
pub struct BodyDocumentIndex {
    store: Arc<dyn DocumentStore>,
}

impl BodyDocumentIndex {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// First body document stored under `phash`
    ///
    /// An absent or empty hash is answered locally with `None`.
    pub async fn lookup_by_hash(&self, phash: Option<&str>) -> Result<Option<BodyDocument>> {
        let phash = match phash {
            Some(phash) if !phash.is_empty() => phash,
            _ => return Ok(None),
        };

        let docs = self
            .store
            .query_by_index(
                IndexName::ByTypeAndPayloadHash,
                &[DocType::Content.as_str(), phash],
            )
            .await?;

        Ok(docs
            .into_iter()
            .next()
            .map(|doc| BodyDocument::from_document(doc, phash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::r#impl::InMemoryDocumentStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_lookup_takes_first_match() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .create_doc(json!({"type": "cnt", "phash": "H1", "raw": "first", "content-type": "text/plain"}))
            .await
            .unwrap();
        store
            .create_doc(json!({"type": "cnt", "phash": "H1", "raw": "second"}))
            .await
            .unwrap();

        let index = BodyDocumentIndex::new(store);
        let body = index.lookup_by_hash(Some("H1")).await.unwrap().unwrap();

        assert_eq!(body.raw, "first");
        assert_eq!(body.content_type.as_deref(), Some("text/plain"));
        assert_eq!(body.transfer_encoding, None);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_hashes() {
        let index = BodyDocumentIndex::new(Arc::new(InMemoryDocumentStore::new()));

        assert!(index.lookup_by_hash(Some("nope")).await.unwrap().is_none());
        assert!(index.lookup_by_hash(Some("")).await.unwrap().is_none());
        assert!(index.lookup_by_hash(None).await.unwrap().is_none());
    }
}
