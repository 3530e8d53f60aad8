//! A page host backed by a fetched HTML document.
//!
//! Outside a browser there is no live DOM or performance timeline, so:
//! - the DOM is the HTML served at the page URL
//! - the load-timing snapshot comes from a HAR file, when one is supplied
//! - the live feed is whatever channel the caller wires in

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use super::{Fetcher, PageHost, ResourceFeed};

/// Page host with a fixed document
pub struct StaticPage {
    location: Url,
    html: Option<String>,
    timing: Option<Vec<String>>,
    feed: Mutex<Option<ResourceFeed>>,
}

impl StaticPage {
    /// Create a host with no DOM, no timing data and no live feed
    pub fn new(location: Url) -> Self {
        Self {
            location,
            html: None,
            timing: None,
            feed: Mutex::new(None),
        }
    }

    /// Fetch the document at `location` and use it as the DOM
    pub async fn load(fetcher: &dyn Fetcher, location: Url) -> Result<Self> {
        let response = fetcher
            .fetch(&location)
            .await
            .with_context(|| format!("Failed to fetch page: {}", location))?;

        if !response.is_success() {
            anyhow::bail!(
                "Failed to fetch page {}: {} {}",
                location,
                response.status,
                response.status_text
            );
        }

        let html = String::from_utf8_lossy(&response.body).into_owned();
        Ok(Self::new(location).with_html(html))
    }

    /// Like [`StaticPage::load`], but a page that cannot be fetched yields a
    /// host without a DOM instead of an error
    ///
    /// Discovery still runs from the timing snapshot and the live feed; the
    /// document itself is then left out of the manifest.
    pub async fn open(fetcher: &dyn Fetcher, location: Url) -> Self {
        match Self::load(fetcher, location.clone()).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Continuing without the page DOM: {:#}", e);
                Self::new(location)
            }
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Supply the one-shot load-timing snapshot
    pub fn with_timing(mut self, urls: Vec<String>) -> Self {
        self.timing = Some(urls);
        self
    }

    /// Supply the live resource feed
    pub fn with_feed(self, feed: ResourceFeed) -> Self {
        *self.feed.lock().unwrap_or_else(PoisonError::into_inner) = Some(feed);
        self
    }
}

#[async_trait]
impl PageHost for StaticPage {
    fn location(&self) -> &Url {
        &self.location
    }

    async fn document_html(&self) -> Option<String> {
        self.html.clone()
    }

    fn resource_timing(&self) -> Option<Vec<String>> {
        self.timing.clone()
    }

    fn observe_resources(&self) -> Option<ResourceFeed> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

#[derive(Debug, Deserialize)]
struct Har {
    log: HarLog,
}

#[derive(Debug, Deserialize)]
struct HarLog {
    #[serde(default)]
    entries: Vec<HarEntry>,
}

#[derive(Debug, Deserialize)]
struct HarEntry {
    request: HarRequest,
}

#[derive(Debug, Deserialize)]
struct HarRequest {
    url: String,
}

/// Parse the request URLs out of HAR (HTTP Archive) JSON, in recorded order
pub fn parse_har(content: &str) -> Result<Vec<String>> {
    let har: Har = serde_json::from_str(content).context("Failed to parse HAR JSON")?;
    Ok(har.log.entries.into_iter().map(|e| e.request.url).collect())
}

/// Read a HAR file and return its request URLs
pub async fn read_har(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read HAR file: {}", path.display()))?;
    parse_har(&content).with_context(|| format!("Invalid HAR file: {}", path.display()))
}
