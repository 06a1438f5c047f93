//! Error types for vecstore.

use thiserror::Error;

/// Result type for vecstore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vecstore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Collection already exists.
    #[error("Collection '{0}' already exists")]
    CollectionExists(String),

    /// Collection not found.
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    /// Dimension mismatch between vector and collection.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions.
        expected: usize,
        /// Actual dimensions provided.
        actual: usize,
    },

    /// Invalid vector (empty, or contains NaN/infinite components).
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Collection is at its configured capacity.
    #[error("Collection '{name}' is full ({max} vectors)")]
    CapacityExceeded {
        /// Collection name.
        name: String,
        /// Configured maximum.
        max: usize,
    },

    /// Persistence error (serialization, corrupt files).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
