//! The per-kind description the generic engine is instantiated with.
//!
//! Each entity kind names its collection, its key shape, which optional
//! fields it carries, its indexes and how a stored document decodes into its
//! public view. Everything else (issuing, merging, paging) lives once in
//! [`Engine`](crate::Engine).

use std::collections::BTreeMap;

use serde::Serialize;
use uvapp_core::IdIssuer;
use uvapp_store::{Document, Filter, IndexModel};

use crate::error::{EngineError, EngineResult};

/// Optional fields a kind carries besides `title`, `info` and `ctime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Carries {
    pub secret: bool,
    pub env: bool,
    pub status: bool,
    /// A `ver` value field (not a key part).
    pub ver: bool,
}

pub trait EntityKind: Send + Sync + 'static {
    /// Collection holding this kind.
    const COLLECTION: &'static str;
    /// Name used in not-found messages.
    const NAME: &'static str;
    const CARRIES: Carries;

    /// Full key of an existing entity.
    type Key: Send + 'static;
    /// Caller-supplied part of a new entity's key.
    type NewKey: Send + 'static;
    /// Kind-specific query filters.
    type QueryFilter: Send + 'static;
    /// Public shape returned to callers.
    type View: Serialize + Send + 'static;

    /// Indexes to create at startup.
    fn indexes() -> Vec<IndexModel>;

    /// Key for a new entity: issued, or validated from the caller's input.
    fn issue_key(new_key: Self::NewKey, issuer: &IdIssuer) -> EngineResult<Self::Key>;

    /// Equality filter selecting `key`. Fails on empty key fields.
    fn key_filter(key: &Self::Key) -> EngineResult<Filter>;

    /// Equality filters for a query (the title match is added by the engine).
    fn query_filter(filter: &Self::QueryFilter) -> EngineResult<Filter>;

    /// Public view of a stored document, with `info` already rendered as
    /// wire text.
    fn decode(doc: &Document, info: String) -> Self::View;
}

/// Mutable fields supplied on create. Fields the kind does not carry are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub title: String,
    /// JSON text; empty means absent.
    pub info: String,
    pub env: BTreeMap<String, String>,
    pub status: i64,
    pub ver: String,
}

/// Partial update. Empty strings, `false` and empty maps leave the stored
/// value alone. Fields the kind does not carry are ignored.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    pub title: String,
    /// Issue a new secret.
    pub rotate_secret: bool,
    /// JSON object text, merged per top-level key.
    pub info: String,
    /// Merged per key.
    pub env: BTreeMap<String, String>,
    /// Integer text.
    pub status: String,
    pub ver: String,
}

/// Fail with `MissingParam` when `value` is empty.
pub fn require(name: &'static str, value: &str) -> EngineResult<()> {
    if value.is_empty() {
        return Err(EngineError::MissingParam(name));
    }
    Ok(())
}

/// Parse a Ver status code.
pub fn parse_status(text: &str) -> EngineResult<i64> {
    text.trim()
        .parse()
        .map_err(|_| EngineError::InvalidInput(format!("invalid status {text:?}")))
}
