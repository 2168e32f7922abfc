pub mod memory;
pub mod tantivy;

pub use self::memory::InMemorySearchEngine;
pub use self::tantivy::TantivySearchEngine;
