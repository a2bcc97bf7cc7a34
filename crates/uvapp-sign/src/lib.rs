//! uvapp-sign — time-bounded URLs for object storage.
//!
//! [`UrlSigner`] is the seam the service consumes; [`S3Signer`] implements
//! it with AWS Signature Version 4 (query-string presigned GET and
//! browser-based POST policy uploads), which S3-compatible stores accept.

pub mod error;
pub mod s3;
pub mod signer;

pub use error::{SignError, SignResult};
pub use s3::{S3Signer, S3SignerConfig};
pub use signer::{PostForm, UrlSigner};
