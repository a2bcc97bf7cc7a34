//! Service configuration file parser.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! data_dir = "/var/lib/uvapp"
//! request_timeout_secs = 10
//!
//! [service]
//! db = "uv"
//! base_path = "app/"
//! aid = 1
//! nid = 3
//! expires = 300
//! app_max_size = 104857600
//!
//! [oss]
//! endpoint = "https://s3.us-east-1.amazonaws.com"
//! bucket = "uv-artifacts"
//! region = "us-east-1"
//! access_key_id = "..."
//! secret_access_key = "..."
//! virtual_host = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ids::MAX_SCOPE_ID;

/// Longest validity an SigV4 presigned URL may carry.
pub const MAX_EXPIRES_SECS: u64 = 604_800;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub service: AppServiceConfig,
    #[serde(default)]
    pub oss: OssConfig,
}

/// Listener and runtime settings for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub data_dir: PathBuf,
    /// Upper bound on a single engine call, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("./data"),
            request_timeout_secs: 10,
        }
    }
}

/// Settings of the app service itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppServiceConfig {
    /// Database name; the store file is `{data_dir}/{db}.redb`.
    pub db: String,
    /// Prefix of every artifact object key.
    pub base_path: String,
    /// Region id used by the identifier issuer.
    pub aid: i64,
    /// Node id used by the identifier issuer.
    pub nid: i64,
    /// Default signed-URL validity when a request carries none.
    pub expires: u64,
    /// Largest artifact accepted by an upload URL, in bytes.
    pub app_max_size: u64,
}

impl Default for AppServiceConfig {
    fn default() -> Self {
        Self {
            db: "uv".to_string(),
            base_path: String::new(),
            aid: 0,
            nid: 0,
            expires: 300,
            app_max_size: 100 * 1024 * 1024,
        }
    }
}

/// Object storage the signer issues URLs for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OssConfig {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Address objects as `{bucket}.{host}` instead of `{host}/{bucket}`.
    pub virtual_host: bool,
}

impl Default for OssConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.amazonaws.com".to_string(),
            bucket: String::new(),
            region: "us-east-1".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            virtual_host: false,
        }
    }
}

impl ServiceConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings the service cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let service = &self.service;
        if service.db.is_empty() || service.db.contains(['/', '\\']) {
            anyhow::bail!("service.db must be a plain, non-empty name, got {:?}", service.db);
        }
        for (name, value) in [("service.aid", service.aid), ("service.nid", service.nid)] {
            if !(0..=MAX_SCOPE_ID).contains(&value) {
                anyhow::bail!("{name} must be within 0..={MAX_SCOPE_ID}, got {value}");
            }
        }
        if !(1..=MAX_EXPIRES_SECS).contains(&service.expires) {
            anyhow::bail!(
                "service.expires must be within 1..={MAX_EXPIRES_SECS}, got {}",
                service.expires
            );
        }
        if service.app_max_size == 0 {
            anyhow::bail!("service.app_max_size must be positive");
        }
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be positive");
        }
        if !self.oss.endpoint.starts_with("http://") && !self.oss.endpoint.starts_with("https://") {
            anyhow::bail!("oss.endpoint must be an http(s) URL, got {:?}", self.oss.endpoint);
        }
        Ok(())
    }

    /// Path of the store file.
    pub fn db_path(&self) -> PathBuf {
        self.server.data_dir.join(format!("{}.redb", self.service.db))
    }
}
