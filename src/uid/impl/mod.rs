pub mod memory;
pub mod sqlite;

pub use memory::InMemoryUidIndexer;
pub use sqlite::SqliteUidIndexer;
