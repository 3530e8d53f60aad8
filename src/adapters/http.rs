//! reqwest-backed fetcher.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use url::Url;

use super::{FetchError, FetchResponse, Fetcher};

/// Default User-Agent sent with every fetch
pub const DEFAULT_USER_AGENT: &str = concat!("pagemanifest/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher that always revalidates with the origin
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout and User-Agent
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    /// Create from resolved configuration
    pub fn from_settings(settings: &crate::config::FetchSettings) -> Result<Self> {
        Self::new(
            Duration::from_secs(settings.timeout_seconds),
            &settings.user_agent,
        )
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        // Bodies of failed responses are never hashed
        let body = if status.is_success() {
            response.bytes().await?.to_vec()
        } else {
            Vec::new()
        };

        Ok(FetchResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent() {
        assert!(DEFAULT_USER_AGENT.starts_with("pagemanifest/"));
    }

    #[test]
    fn test_build_client() {
        assert!(HttpFetcher::new(Duration::from_secs(5), DEFAULT_USER_AGENT).is_ok());
    }
}
