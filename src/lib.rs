//! Cairn - a document-graph mail store with a synchronized search index
//!
//! Mails are stored as independent documents (flags, a head descriptor and
//! one body document per MIME leaf) and reassembled on read. A mail store
//! layer keeps a full-text search index in step with every mutation.

pub mod assembler;
pub mod body;
pub mod config;
pub mod content;
pub mod docstore;
pub mod error;
pub mod head;
mod locks;
pub mod mail;
pub mod mailstore;
pub mod maintenance;
pub mod querier;
pub mod search;
pub mod services;
pub mod tags;
pub mod types;
pub mod uid;

pub use assembler::{MessageAssembler, ReconstructedMessage};
pub use body::{BodyDocument, BodyDocumentIndex};
pub use config::Config;
pub use docstore::DocumentStore;
pub use error::{Error, Result};
pub use head::HeadDescriptor;
pub use mail::{InputMail, PersistableMail};
pub use mailstore::{Capability, MailStore, SearchableMailStore};
pub use querier::MailQuerier;
pub use search::{SearchEngine, SearchQuery};
pub use services::Services;
pub use tags::TagService;
pub use types::*;
pub use uid::UidIndexer;
