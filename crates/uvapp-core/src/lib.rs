//! uvapp-core — configuration and identifier issuance shared by the app
//! service crates.

pub mod config;
pub mod ids;

pub use config::{AppServiceConfig, OssConfig, ServerConfig, ServiceConfig};
pub use ids::{IdError, IdIssuer, IdParts, new_secret};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in seconds.
pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
