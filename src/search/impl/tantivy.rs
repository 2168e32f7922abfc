//! Tantivy-based search engine implementation

use async_trait::async_trait;
use futures::channel::oneshot;
use std::collections::BTreeSet;
use std::path::Path;
use tantivy::{
    collector::TopDocs,
    query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery},
    schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT},
    Index as TantivyIndex, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
};
use tokio::sync::mpsc::{channel, Receiver, Sender};

use crate::error::{Error, Result};
use crate::search::{IndexedMail, SearchEngine, SearchQuery};
use crate::types::{MailId, StoredMail};

/// Heap given to the index writer unless configured otherwise
pub const DEFAULT_WRITER_HEAP_BYTES: usize = 50_000_000;

/// Write commands for the index (only writes go through the channel)
enum WriteCommand {
    Index(IndexedMail, oneshot::Sender<Result<()>>),
    Remove(MailId, oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone, Copy)]
struct Fields {
    ident: Field,
    mailbox: Field,
    /// User tags and the mailbox tag, for queries
    tag: Field,
    /// User tags only, stored for listing
    user_tag: Field,
    subject: Field,
    from: Field,
    to: Field,
    body: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut schema_builder = Schema::builder();
    let fields = Fields {
        ident: schema_builder.add_text_field("ident", STRING | STORED),
        mailbox: schema_builder.add_text_field("mailbox", STRING | STORED),
        tag: schema_builder.add_text_field("tag", STRING),
        user_tag: schema_builder.add_text_field("user_tag", STRING | STORED),
        subject: schema_builder.add_text_field("subject", TEXT),
        from: schema_builder.add_text_field("from", TEXT),
        to: schema_builder.add_text_field("to", TEXT),
        body: schema_builder.add_text_field("body", TEXT),
    };
    (schema_builder.build(), fields)
}

/// Tantivy-backed search engine
///
/// Writes go through a writer loop that deletes any previous entry for the
/// ident, adds the new one and commits. The reader is reloaded before the
/// write is acknowledged, so searches see every acknowledged write.
pub struct TantivySearchEngine {
    index: TantivyIndex,
    reader: IndexReader,
    fields: Fields,
    write_tx: Sender<WriteCommand>,
}

impl TantivySearchEngine {
    /// Open (or create) an index in `index_path`
    pub fn new<P: AsRef<Path>>(index_path: P, writer_heap_bytes: usize) -> Result<Self> {
        let index_path = index_path.as_ref();
        let (schema, fields) = build_schema();

        let index = if index_path.join("meta.json").exists() {
            TantivyIndex::open_in_dir(index_path)
                .map_err(|e| Error::Index(format!("Failed to open index: {}", e)))?
        } else {
            std::fs::create_dir_all(index_path)?;
            TantivyIndex::create_in_dir(index_path, schema)
                .map_err(|e| Error::Index(format!("Failed to create index: {}", e)))?
        };

        Self::from_index(index, fields, writer_heap_bytes)
    }

    /// Index held in RAM, for testing
    pub fn in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        Self::from_index(
            TantivyIndex::create_in_ram(schema),
            fields,
            DEFAULT_WRITER_HEAP_BYTES,
        )
    }

    fn from_index(index: TantivyIndex, fields: Fields, writer_heap_bytes: usize) -> Result<Self> {
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| Error::Index(format!("Failed to create reader: {}", e)))?;
        let writer: IndexWriter = index
            .writer_with_num_threads(1, writer_heap_bytes)
            .map_err(|e| Error::Index(format!("Failed to create writer: {}", e)))?;

        let (write_tx, write_rx) = channel(100);
        let loop_reader = reader.clone();
        tokio::task::spawn_blocking(move || writer_loop(write_rx, writer, loop_reader, fields));

        Ok(Self {
            index,
            reader,
            fields,
            write_tx,
        })
    }

    async fn send(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<()>>) -> WriteCommand,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.write_tx
            .send(make(tx))
            .await
            .map_err(|_| Error::Internal("Writer loop stopped".to_string()))?;
        rx.await
            .map_err(|_| Error::Internal("Writer loop dropped reply".to_string()))?
    }

    /// Stop the writer loop and release the index writer lock
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.write_tx.send(WriteCommand::Shutdown(tx)).await;
        let _ = rx.await;
        Ok(())
    }

    fn text_query(&self, text: &str, fields: Vec<Field>) -> Box<dyn Query> {
        let mut parser = QueryParser::for_index(&self.index, fields);
        parser.set_conjunction_by_default();
        let (query, errors) = parser.parse_query_lenient(text);
        if !errors.is_empty() {
            log::debug!("Lenient parse of '{}' dropped {} clause(s)", text, errors.len());
        }
        query
    }

    fn term_query(field: Field, value: &str) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(field, value),
            IndexRecordOption::Basic,
        ))
    }

    fn build_query(&self, query: &SearchQuery) -> Box<dyn Query> {
        let f = self.fields;
        match query {
            SearchQuery::All => Box::new(AllQuery),
            SearchQuery::Text(text) => {
                self.text_query(text, vec![f.subject, f.from, f.to, f.body])
            }
            SearchQuery::From(text) => self.text_query(text, vec![f.from]),
            SearchQuery::To(text) => self.text_query(text, vec![f.to]),
            SearchQuery::Subject(text) => self.text_query(text, vec![f.subject]),
            SearchQuery::Body(text) => self.text_query(text, vec![f.body]),
            SearchQuery::Tag(tag) => Self::term_query(f.tag, tag),
            SearchQuery::Mailbox(name) => Self::term_query(f.mailbox, name),
            SearchQuery::And(queries) if queries.is_empty() => Box::new(AllQuery),
            SearchQuery::And(queries) => Box::new(BooleanQuery::new(
                queries
                    .iter()
                    .map(|q| (Occur::Must, self.build_query(q)))
                    .collect(),
            )),
            SearchQuery::Or(queries) => Box::new(BooleanQuery::new(
                queries
                    .iter()
                    .map(|q| (Occur::Should, self.build_query(q)))
                    .collect(),
            )),
            SearchQuery::Not(inner) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                (Occur::MustNot, self.build_query(inner)),
            ])),
        }
    }

    /// Stored documents matching `query`
    fn matching_docs(&self, query: &dyn Query) -> Result<Vec<TantivyDocument>> {
        let searcher = self.reader.searcher();
        let limit = (searcher.num_docs() as usize).max(1);

        let top_docs = searcher
            .search(query, &TopDocs::with_limit(limit))
            .map_err(|e| Error::Index(format!("Search failed: {}", e)))?;

        let mut docs = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| Error::Index(format!("Failed to retrieve document: {}", e)))?;
            docs.push(doc);
        }
        Ok(docs)
    }
}

fn to_document(mail: &IndexedMail, fields: &Fields) -> TantivyDocument {
    let mut doc = TantivyDocument::default();
    doc.add_text(fields.ident, mail.ident.as_str());
    doc.add_text(fields.mailbox, &mail.mailbox);
    for tag in mail.all_tags() {
        doc.add_text(fields.tag, &tag);
    }
    for tag in &mail.tags {
        doc.add_text(fields.user_tag, tag);
    }
    doc.add_text(fields.subject, &mail.subject);
    doc.add_text(fields.from, &mail.from);
    doc.add_text(fields.to, &mail.to);
    doc.add_text(fields.body, &mail.body);
    doc
}

fn commit_and_reload(writer: &mut IndexWriter, reader: &IndexReader) -> Result<()> {
    writer
        .commit()
        .map_err(|e| Error::Index(format!("Failed to commit: {}", e)))?;
    reader
        .reload()
        .map_err(|e| Error::Index(format!("Failed to reload reader: {}", e)))?;
    Ok(())
}

fn writer_loop(
    mut rx: Receiver<WriteCommand>,
    mut writer: IndexWriter,
    reader: IndexReader,
    fields: Fields,
) {
    let mut shutdown_reply = None;
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            WriteCommand::Index(mail, reply) => {
                writer.delete_term(Term::from_field_text(fields.ident, mail.ident.as_str()));
                let result = writer
                    .add_document(to_document(&mail, &fields))
                    .map_err(|e| Error::Index(format!("Failed to add document: {}", e)))
                    .and_then(|_| commit_and_reload(&mut writer, &reader));
                if let Err(e) = &result {
                    log::error!("Indexing {} failed: {}", mail.ident, e);
                }
                let _ = reply.send(result);
            }
            WriteCommand::Remove(id, reply) => {
                writer.delete_term(Term::from_field_text(fields.ident, id.as_str()));
                let _ = reply.send(commit_and_reload(&mut writer, &reader));
            }
            WriteCommand::Shutdown(reply) => {
                shutdown_reply = Some(reply);
                break;
            }
        }
    }

    drop(writer);
    log::debug!("Search index writer loop stopped");
    if let Some(reply) = shutdown_reply {
        let _ = reply.send(());
    }
}

#[async_trait]
impl SearchEngine for TantivySearchEngine {
    async fn index_mail(&self, mail: &StoredMail) -> Result<()> {
        let entry = IndexedMail::from_mail(mail);
        self.send(|reply| WriteCommand::Index(entry, reply)).await
    }

    async fn remove_from_index(&self, id: &MailId) -> Result<()> {
        let id = id.clone();
        self.send(|reply| WriteCommand::Remove(id, reply)).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MailId>> {
        let query = self.build_query(query);
        Ok(self
            .matching_docs(query.as_ref())?
            .iter()
            .filter_map(|doc| doc.get_first(self.fields.ident).and_then(|v| v.as_str()))
            .map(MailId::from)
            .collect())
    }

    async fn tags(&self) -> Result<Vec<String>> {
        let mut tags = BTreeSet::new();
        for doc in self.matching_docs(&AllQuery)? {
            for value in doc.get_all(self.fields.user_tag) {
                if let Some(tag) = value.as_str() {
                    tags.insert(tag.to_string());
                }
            }
        }
        Ok(tags.into_iter().collect())
    }
}
