//! The signer seam.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::SignResult;

/// Upload form for a browser-style POST: the target URL and the fields the
/// client must send along with the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostForm {
    pub url: String,
    pub fields: BTreeMap<String, String>,
}

/// Issues capability-bearing URLs for single objects.
pub trait UrlSigner: Send + Sync {
    /// Download URL for `key`, valid for `ttl`.
    fn get_sign_url(&self, key: &str, ttl: Duration) -> SignResult<String>;

    /// Upload form for `key`, valid for `ttl`, accepting at most `max_size`
    /// bytes. `extra` fields are added to the form and pinned by the policy.
    fn post_sign_url(
        &self,
        key: &str,
        ttl: Duration,
        max_size: u64,
        extra: &BTreeMap<String, String>,
    ) -> SignResult<PostForm>;
}
