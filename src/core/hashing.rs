//! Fetch-and-hash of individual resources.
//!
//! Identical bytes always yield the identical digest; the digest is what
//! makes the manifest content-addressable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};
use url::Url;

use crate::adapters::Fetcher;

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Result of fetching and hashing a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashResult {
    pub hash_sha256: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub status: u16,
}

/// SHA-256 of `bytes` as lowercase hex
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fetches resources and digests their bytes
#[derive(Clone)]
pub struct HashingService {
    fetcher: Arc<dyn Fetcher>,
}

impl HashingService {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch `url` and hash the exact bytes received
    ///
    /// Returns `None` for non-success statuses and transport failures; the
    /// resource is then left out of the manifest.
    pub async fn fetch_and_hash(&self, url: &Url) -> Option<HashResult> {
        let response = match self.fetcher.fetch(url).await {
            Ok(response) => response,
            Err(e) => {
                error!("Error fetching {}: {}", url, e);
                return None;
            }
        };

        if !response.is_success() {
            warn!(
                "Failed to fetch {}: {} {}",
                url, response.status, response.status_text
            );
            return None;
        }

        let hash_sha256 = hash_bytes(&response.body);
        debug!(%url, size = response.body.len(), "Hashed resource");

        Some(HashResult {
            hash_sha256,
            size_bytes: response.body.len() as u64,
            content_type: response.content_type,
            status: response.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FetchError, FetchResponse};
    use async_trait::async_trait;

    struct FixedFetcher {
        status: u16,
        body: &'static [u8],
        fail: bool,
    }

    #[async_trait]
    impl Fetcher for FixedFetcher {
        async fn fetch(&self, _url: &Url) -> Result<FetchResponse, FetchError> {
            if self.fail {
                return Err(FetchError::Transport("connection refused".to_string()));
            }
            Ok(FetchResponse {
                status: self.status,
                status_text: String::new(),
                content_type: Some("text/css".to_string()),
                body: self.body.to_vec(),
            })
        }
    }

    fn service(status: u16, body: &'static [u8], fail: bool) -> HashingService {
        HashingService::new(Arc::new(FixedFetcher { status, body, fail }))
    }

    fn url() -> Url {
        Url::parse("https://example.com/app.css").unwrap()
    }

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_is_fixed_length_and_deterministic() {
        let small = hash_bytes(b"x");
        let large = hash_bytes(&vec![7u8; 1 << 20]);

        assert_eq!(small.len(), DIGEST_HEX_LEN);
        assert_eq!(large.len(), DIGEST_HEX_LEN);
        assert_eq!(small, hash_bytes(b"x"));
        assert!(small.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_single_byte_change_changes_digest() {
        assert_ne!(hash_bytes(b"body { color: red }"), hash_bytes(b"body { color: rad }"));
    }

    #[tokio::test]
    async fn test_fetch_and_hash_success() {
        let result = service(200, b"abc", false).fetch_and_hash(&url()).await.unwrap();

        assert_eq!(result.hash_sha256, hash_bytes(b"abc"));
        assert_eq!(result.size_bytes, 3);
        assert_eq!(result.content_type.as_deref(), Some("text/css"));
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn test_non_success_status_is_none() {
        assert!(service(404, b"", false).fetch_and_hash(&url()).await.is_none());
        assert!(service(500, b"oops", false).fetch_and_hash(&url()).await.is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_is_none() {
        assert!(service(200, b"", true).fetch_and_hash(&url()).await.is_none());
    }
}
