//! Adapter interfaces for the outside world.
//!
//! The pipeline never talks to the network, the page or storage directly;
//! it goes through these seams so hosts and backends can be swapped.

pub mod http;
pub mod page;
pub mod store;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

pub use http::HttpFetcher;
pub use page::{read_har, StaticPage};
pub use store::{FileStore, ManifestStore, MemoryStore, StoreError, STORAGE_KEY};

/// Errors raised while fetching a resource
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Raw response of a fetch
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,

    /// Reason phrase for the status, if known
    pub status_text: String,

    /// Content-Type header value
    pub content_type: Option<String>,

    /// Full response body (empty for non-success responses)
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetches resource bytes, bypassing any local cache
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError>;
}

/// Batches of resource URLs reported by a host as they finish loading
pub type ResourceFeed = mpsc::Receiver<Vec<String>>;

/// The page whose resources are being inventoried
#[async_trait]
pub trait PageHost: Send + Sync {
    /// Page URL; its origin decides which resources are same-origin
    fn location(&self) -> &Url;

    /// Current DOM serialized as HTML, if the host exposes one
    async fn document_html(&self) -> Option<String>;

    /// One-shot load-timing snapshot (every resource loaded since navigation start)
    ///
    /// `None` means the host has no such capability.
    fn resource_timing(&self) -> Option<Vec<String>>;

    /// Live stream of loaded resources, buffered from navigation start
    ///
    /// `None` means the host has no such capability or the feed was already taken.
    fn observe_resources(&self) -> Option<ResourceFeed>;
}
