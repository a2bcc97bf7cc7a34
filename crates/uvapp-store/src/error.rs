//! Error types for the document store.

use thiserror::Error;

/// Result type alias for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("index {0} already exists with a different definition")]
    IndexConflict(String),

    #[error("cannot set {path}: {field} holds a non-object value")]
    NotAnObject { path: String, field: String },

    #[error("duplicate key error: index {index} key {key}")]
    DuplicateKey { index: String, key: String },
}

impl StoreError {
    /// Whether the error was caused by the caller's input rather than by
    /// the store itself.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, StoreError::InvalidUpdate(_))
    }
}
