//! Remote client implementations for existence checks.
//!
//! The checker only needs one primitive from the object store: "list the
//! objects whose key starts with this prefix". [`ObjectLister`] is that seam;
//! the S3 REST client is the shipped implementation and tests plug in fakes.

use crate::error::KeyCheckError;
use async_trait::async_trait;

/// S3 `ListObjectsV2` implementation
#[cfg(feature = "s3")]
pub mod s3;

/// SigV4 request signing for the S3 client
#[cfg(feature = "s3")]
pub mod sigv4;

#[cfg(feature = "s3")]
pub use s3::S3Client;
#[cfg(feature = "s3")]
pub use sigv4::Credentials;

/// One entry of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
}

impl ListedObject {
    pub fn new<K: Into<String>>(key: K) -> Self {
        Self { key: key.into() }
    }
}

/// A remote store that can list objects by key prefix.
#[async_trait]
pub trait ObjectLister: Send + Sync {
    /// List objects in `bucket` whose key starts with `prefix`.
    ///
    /// An empty listing is a normal answer, not an error. Implementations
    /// may return a truncated listing as long as an object whose key equals
    /// `prefix` exactly is included when it exists.
    async fn list_by_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ListedObject>, KeyCheckError>;

    /// Verify that `bucket` is reachable before a run starts.
    async fn probe(&self, bucket: &str) -> Result<(), KeyCheckError> {
        let _ = bucket;
        Ok(())
    }
}
