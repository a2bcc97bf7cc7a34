//! Signed download and upload URLs for version artifacts.
//!
//! An artifact of app `appid`, version `ver`, built for `ability`, lives at
//! `{base_path}{appid}/v{ver}-{ability}.zip`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uvapp_sign::UrlSigner;

use crate::entity::require;
use crate::error::EngineResult;
use crate::fields::{APPID, VER};

/// Identifies one artifact object.
#[derive(Debug, Clone, Default)]
pub struct ArtifactRef {
    pub appid: String,
    pub ver: String,
    pub ability: String,
}

/// Upload instructions handed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadUrl {
    pub url: String,
    /// Form fields to send with the file.
    pub data: BTreeMap<String, String>,
    pub method: String,
    /// Form field name carrying the file.
    pub key: String,
}

#[derive(Clone)]
pub struct Artifacts {
    signer: Arc<dyn UrlSigner>,
    base_path: String,
    max_size: u64,
    default_expires: u64,
}

impl Artifacts {
    pub fn new(signer: Arc<dyn UrlSigner>, base_path: String, max_size: u64, default_expires: u64) -> Self {
        Self {
            signer,
            base_path,
            max_size,
            default_expires,
        }
    }

    /// Time-bounded download URL. A non-positive `expires` uses the default.
    pub fn get_url(&self, artifact: &ArtifactRef, expires: i64) -> EngineResult<String> {
        let key = self.object_key(artifact)?;
        let ttl = self.ttl(expires);
        debug!(%key, ttl = ttl.as_secs(), "signing artifact download");
        Ok(self.signer.get_sign_url(&key, ttl)?)
    }

    /// Time-bounded upload form limited to the configured maximum size.
    pub fn up_url(&self, artifact: &ArtifactRef, expires: i64) -> EngineResult<UploadUrl> {
        let key = self.object_key(artifact)?;
        let ttl = self.ttl(expires);
        debug!(%key, ttl = ttl.as_secs(), "signing artifact upload");
        let form = self
            .signer
            .post_sign_url(&key, ttl, self.max_size, &BTreeMap::new())?;
        Ok(UploadUrl {
            url: form.url,
            data: form.fields,
            method: "POST".to_string(),
            key: "file".to_string(),
        })
    }

    fn object_key(&self, artifact: &ArtifactRef) -> EngineResult<String> {
        require(APPID, &artifact.appid)?;
        require(VER, &artifact.ver)?;
        require("ability", &artifact.ability)?;
        Ok(format!(
            "{}{}/v{}-{}.zip",
            self.base_path, artifact.appid, artifact.ver, artifact.ability
        ))
    }

    fn ttl(&self, expires: i64) -> Duration {
        if expires > 0 {
            Duration::from_secs(expires as u64)
        } else {
            Duration::from_secs(self.default_expires)
        }
    }
}
