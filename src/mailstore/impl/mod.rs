pub mod document;

pub use document::DocumentMailStore;
