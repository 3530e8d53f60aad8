//! Shared test fixtures: an in-memory fetcher and page builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pagemanifest::adapters::{FetchError, FetchResponse, Fetcher};
use url::Url;

/// Serves canned responses keyed by absolute URL and counts fetches
#[derive(Default)]
pub struct MapFetcher {
    resources: HashMap<String, FetchResponse>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200
    pub fn with(mut self, url: &str, content_type: &str, body: &[u8]) -> Self {
        self.resources.insert(
            url.to_string(),
            FetchResponse {
                status: 200,
                status_text: "OK".to_string(),
                content_type: Some(content_type.to_string()),
                body: body.to_vec(),
            },
        );
        self
    }

    /// Serve an empty body with `status`
    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.resources.insert(
            url.to_string(),
            FetchResponse {
                status,
                status_text: String::new(),
                content_type: None,
                body: Vec::new(),
            },
        );
        self
    }

    /// Delay every response, so concurrent fetches overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Fetcher for MapFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.resources
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Transport(format!("connection refused: {}", url)))
    }
}

pub const PAGE_URL: &str = "https://example.com/";

pub const PAGE_HTML: &str = r#"<!doctype html>
<html>
<head>
    <link rel="stylesheet" href="/css/site.css">
</head>
<body>
    <img src="images/logo.png">
</body>
</html>"#;

pub fn page_url() -> Url {
    Url::parse(PAGE_URL).unwrap()
}

/// Fetcher serving the demo page, its stylesheet and its image
pub fn site_fetcher() -> MapFetcher {
    MapFetcher::new()
        .with(PAGE_URL, "text/html; charset=utf-8", PAGE_HTML.as_bytes())
        .with(
            "https://example.com/css/site.css",
            "text/css",
            b"body { margin: 0 }",
        )
        .with(
            "https://example.com/images/logo.png",
            "image/png",
            &[0x89, b'P', b'N', b'G', 0, 1, 2, 3],
        )
}
