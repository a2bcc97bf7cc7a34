//! The four entity kinds.

pub mod ac;
pub mod app;
pub mod container;
pub mod ver;

pub use ac::{Ac, AcFilter, AcKey, AcKind};
pub use app::{App, AppKey, AppKind};
pub use container::{Container, ContainerKey, ContainerKind};
pub use ver::{Ver, VerFilter, VerKey, VerKind};
