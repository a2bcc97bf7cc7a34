//! Engine error taxonomy and its wire codes.

use thiserror::Error;
use uvapp_sign::SignError;
use uvapp_store::StoreError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

pub const ERRNO_OK: i32 = 200;
pub const ERRNO_INPUT_DATA: i32 = 400;
pub const ERRNO_NOT_FOUND: i32 = 404;
pub const ERRNO_INTERNAL_SERVER: i32 = 500;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A required field was empty.
    #[error("not found param {0}")]
    MissingParam(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    /// The key resolved to no document. Carries the entity name.
    #[error("not found {0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// Wire code for this error.
    pub fn errno(&self) -> i32 {
        match self {
            EngineError::MissingParam(_) | EngineError::InvalidInput(_) => ERRNO_INPUT_DATA,
            EngineError::NotFound(_) => ERRNO_NOT_FOUND,
            EngineError::Internal(_) => ERRNO_INTERNAL_SERVER,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        if e.is_caller_error() {
            EngineError::InvalidInput(e.to_string())
        } else {
            EngineError::Internal(e.to_string())
        }
    }
}

impl From<SignError> for EngineError {
    fn from(e: SignError) -> Self {
        EngineError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Internal(e.to_string())
    }
}
