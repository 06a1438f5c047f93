//! Configuration for vecstore.

use std::path::PathBuf;

/// Configuration for the vector database.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Path to store data on disk. If None, data is kept in memory only.
    pub data_path: Option<PathBuf>,

    /// Maximum number of vectors per collection (0 = unlimited).
    pub max_vectors: usize,
}

impl Config {
    /// In-memory configuration; nothing is written to disk.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Persistent configuration rooted at `path`, loaded on open.
    pub fn persistent<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            data_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Set the maximum number of vectors per collection.
    pub fn with_max_vectors(mut self, max: usize) -> Self {
        self.max_vectors = max;
        self
    }
}
