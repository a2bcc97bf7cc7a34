//! uvapp-store — embedded document store for the app service.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! collections of JSON documents with equality/regex/any-of filters,
//! dot-path `$set` updates, atomic find-and-modify, and secondary indexes
//! (unique or not) that can serve sorted scans.
//!
//! # Architecture
//!
//! Documents are JSON-serialized into redb's `&[u8]` value columns, keyed by
//! `_id`. Each index lives in its own table whose keys are an
//! order-preserving encoding of the indexed fields.
//!
//! The `DocumentStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across threads.

pub mod document;
pub mod error;
pub mod store;
pub mod tables;

pub use document::{
    Clause, Document, Filter, FindOneAndUpdateOptions, FindOptions, ID_FIELD, IndexModel,
    ReturnDocument, SortOrder, Update, field_value, set_path,
};
pub use error::{StoreError, StoreResult};
pub use store::{Collection, DocumentStore};
