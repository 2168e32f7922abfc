//! Configuration
//!
//! Configuration is loaded from a TOML file at:
//! 1. an explicitly given path
//! 2. `$CAIRN_CONFIG` (environment variable)
//! 3. built-in defaults when neither is set

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::search::r#impl::tantivy::DEFAULT_WRITER_HEAP_BYTES;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "CAIRN_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    Memory,
    Tantivy,
}

/// Document and UID storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub backend: StorageBackend,
    /// Document database, relative to `data_dir`
    pub documents_file: PathBuf,
    /// UID database, relative to `data_dir`
    pub uids_file: PathBuf,
}

/// Search index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub backend: SearchBackend,
    /// Defaults to `<data_dir>/search`
    pub index_dir: Option<PathBuf>,
    pub writer_heap_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            backend: StorageBackend::Sqlite,
            documents_file: PathBuf::from("documents.db"),
            uids_file: PathBuf::from("uids.db"),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: SearchBackend::Tantivy,
            index_dir: None,
            writer_heap_bytes: DEFAULT_WRITER_HEAP_BYTES,
        }
    }
}

impl Config {
    /// Load from `path`, else from `$CAIRN_CONFIG`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn documents_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.documents_file)
    }

    pub fn uids_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.uids_file)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.search
            .index_dir
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("search"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.search.backend, SearchBackend::Tantivy);
        assert_eq!(config.documents_path(), PathBuf::from("./data/documents.db"));
        assert_eq!(config.index_dir(), PathBuf::from("./data/search"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse(
            "[storage]\nbackend = \"memory\"\n\n[search]\nindex_dir = \"/tmp/idx\"\n",
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(config.index_dir(), PathBuf::from("/tmp/idx"));
        assert_eq!(config.search.writer_heap_bytes, DEFAULT_WRITER_HEAP_BYTES);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[storage\nbackend = 3").unwrap();

        assert!(matches!(Config::from_file(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/cairn.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(Config::parse("[storage]\nbackend = \"postgres\"\n").is_err());
    }
}
