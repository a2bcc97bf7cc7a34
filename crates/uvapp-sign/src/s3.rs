//! AWS Signature Version 4 signer for S3-compatible object storage.
//!
//! Download URLs use query-string authentication with `host` as the only
//! signed header and an unsigned payload. Upload forms carry a base64 POST
//! policy pinning the bucket, the exact key and the allowed size range,
//! signed with the same derived key.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{SignError, SignResult};
use crate::signer::{PostForm, UrlSigner};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const MAX_EXPIRES_SECS: u64 = 604_800;

/// Connection settings for [`S3Signer`].
#[derive(Debug, Clone)]
pub struct S3SignerConfig {
    /// `http(s)://host[:port]` of the storage service.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Address objects as `{bucket}.{host}` instead of `{host}/{bucket}`.
    pub virtual_host: bool,
}

/// SigV4 URL signer.
#[derive(Debug, Clone)]
pub struct S3Signer {
    scheme: String,
    host: String,
    bucket: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
    virtual_host: bool,
}

impl S3Signer {
    pub fn new(config: S3SignerConfig) -> SignResult<Self> {
        let (scheme, rest) = config
            .endpoint
            .split_once("://")
            .ok_or_else(|| SignError::InvalidEndpoint(config.endpoint.clone()))?;
        if scheme != "http" && scheme != "https" {
            return Err(SignError::InvalidEndpoint(config.endpoint.clone()));
        }
        let host = rest.trim_end_matches('/');
        if host.is_empty() || host.contains('/') {
            return Err(SignError::InvalidEndpoint(config.endpoint.clone()));
        }
        if config.bucket.is_empty() {
            return Err(SignError::InvalidEndpoint("bucket must not be empty".to_string()));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            bucket: config.bucket,
            region: config.region,
            access_key_id: config.access_key_id,
            secret_access_key: config.secret_access_key,
            virtual_host: config.virtual_host,
        })
    }

    /// Presigned GET URL as of `now`.
    pub fn presign_get_at(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> SignResult<String> {
        let expires = check_request(key, ttl)?;
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = self.scope(&date);
        let host = self.object_host();
        let path = self.object_path(key);

        // Parameter names sort in this order.
        let query = [
            ("X-Amz-Algorithm", ALGORITHM.to_string()),
            ("X-Amz-Credential", format!("{}/{scope}", self.access_key_id)),
            ("X-Amz-Date", amz_date.clone()),
            ("X-Amz-Expires", expires.to_string()),
            ("X-Amz-SignedHeaders", "host".to_string()),
        ]
        .iter()
        .map(|(k, v)| format!("{k}={}", uri_encode(v, true)))
        .collect::<Vec<_>>()
        .join("&");

        let canonical_request =
            format!("GET\n{path}\n{query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD");
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let signature = hex::encode(hmac_sha256(
            &self.signing_key(&date)?,
            string_to_sign.as_bytes(),
        )?);

        debug!(%key, expires, "presigned download url");
        Ok(format!(
            "{}://{host}{path}?{query}&X-Amz-Signature={signature}",
            self.scheme
        ))
    }

    /// POST upload form as of `now`.
    pub fn post_policy_at(
        &self,
        key: &str,
        ttl: Duration,
        max_size: u64,
        extra: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> SignResult<PostForm> {
        let expires = check_request(key, ttl)?;
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let credential = format!("{}/{}", self.access_key_id, self.scope(&date));
        let expiration = now + TimeDelta::seconds(expires as i64);

        let mut conditions = vec![
            json!({ "bucket": self.bucket }),
            json!({ "key": key }),
            json!(["content-length-range", 0, max_size]),
            json!({ "x-amz-algorithm": ALGORITHM }),
            json!({ "x-amz-credential": credential }),
            json!({ "x-amz-date": amz_date }),
        ];
        conditions.extend(extra.iter().map(|(k, v)| json!({ k.as_str(): v })));
        let policy: Value = json!({
            "expiration": expiration.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            "conditions": conditions,
        });
        let policy = serde_json::to_vec(&policy).map_err(|e| SignError::Serialize(e.to_string()))?;
        let policy = STANDARD.encode(policy);
        let signature = hex::encode(hmac_sha256(&self.signing_key(&date)?, policy.as_bytes())?);

        let mut fields = extra.clone();
        fields.insert("key".to_string(), key.to_string());
        fields.insert("policy".to_string(), policy);
        fields.insert("x-amz-algorithm".to_string(), ALGORITHM.to_string());
        fields.insert("x-amz-credential".to_string(), credential);
        fields.insert("x-amz-date".to_string(), amz_date);
        fields.insert("x-amz-signature".to_string(), signature);

        debug!(%key, expires, max_size, "signed upload policy");
        Ok(PostForm {
            url: self.bucket_url(),
            fields,
        })
    }

    fn scope(&self, date: &str) -> String {
        format!("{date}/{}/{SERVICE}/aws4_request", self.region)
    }

    fn signing_key(&self, date: &str) -> SignResult<Vec<u8>> {
        let k_date = hmac_sha256(
            format!("AWS4{}", self.secret_access_key).as_bytes(),
            date.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
        hmac_sha256(&k_service, b"aws4_request")
    }

    fn object_host(&self) -> String {
        if self.virtual_host {
            format!("{}.{}", self.bucket, self.host)
        } else {
            self.host.clone()
        }
    }

    fn object_path(&self, key: &str) -> String {
        if self.virtual_host {
            format!("/{}", uri_encode(key, false))
        } else {
            format!("/{}/{}", uri_encode(&self.bucket, true), uri_encode(key, false))
        }
    }

    fn bucket_url(&self) -> String {
        if self.virtual_host {
            format!("{}://{}/", self.scheme, self.object_host())
        } else {
            format!("{}://{}/{}", self.scheme, self.host, self.bucket)
        }
    }
}

impl UrlSigner for S3Signer {
    fn get_sign_url(&self, key: &str, ttl: Duration) -> SignResult<String> {
        self.presign_get_at(key, ttl, Utc::now())
    }

    fn post_sign_url(
        &self,
        key: &str,
        ttl: Duration,
        max_size: u64,
        extra: &BTreeMap<String, String>,
    ) -> SignResult<PostForm> {
        self.post_policy_at(key, ttl, max_size, extra, Utc::now())
    }
}

fn check_request(key: &str, ttl: Duration) -> SignResult<u64> {
    if key.is_empty() {
        return Err(SignError::EmptyKey);
    }
    let secs = ttl.as_secs();
    if !(1..=MAX_EXPIRES_SECS).contains(&secs) {
        return Err(SignError::InvalidExpiry(secs));
    }
    Ok(secs)
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> SignResult<Vec<u8>> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| SignError::InvalidSigningKey(e.to_string()))?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode everything outside the unreserved set; `/` is kept when
/// `encode_slash` is false.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
