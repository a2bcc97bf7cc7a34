//! uvapp-engine — entity lifecycle engine for the app service.
//!
//! Manages four entity kinds over a [`uvapp_store::DocumentStore`]:
//! applications, their versions, deployment containers, and activations
//! binding a container to an app version. Each kind gets the same five
//! operations (create, remove, set, get, query) from one generic
//! [`Engine`]; [`Artifacts`] issues signed URLs for version artifacts.

pub mod artifact;
pub mod engine;
pub mod entity;
pub mod error;
pub mod fields;
pub mod kinds;
pub mod query;

pub use artifact::{ArtifactRef, Artifacts, UploadUrl};
pub use engine::Engine;
pub use entity::{Carries, Draft, EntityKind, Patch};
pub use error::{EngineError, EngineResult};
pub use kinds::*;
pub use query::{Page, Paging, QueryPage, Search};
