//! Error types for URL signing.

use thiserror::Error;

/// Result type alias for signing operations.
pub type SignResult<T> = Result<T, SignError>;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("object key must not be empty")]
    EmptyKey,

    #[error("expiry of {0}s outside 1..=604800")]
    InvalidExpiry(u64),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}
