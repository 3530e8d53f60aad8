//! Resource discoverers.
//!
//! Three independent sources of candidate URLs, run in sequence by a
//! rebuild. Within one discoverer, submissions race freely; dedup makes the
//! overlap between sources harmless.

use std::collections::HashSet;

use futures::future::join_all;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::adapters::PageHost;
use crate::domain::{document_key_override, to_absolute_url, EntryKind, SharedManifest};

use super::assembler::ManifestAssembler;

/// Element selectors and the attribute carrying the asset URL
const DOM_ASSET_SELECTORS: &[(&str, &str)] = &[
    // Favicon and icons
    (r#"link[rel~="icon"]"#, "href"),
    (r#"link[rel="stylesheet"]"#, "href"),
    ("img[src]", "src"),
    ("script[src]", "src"),
    ("video[src]", "src"),
    ("audio[src]", "src"),
    // <source> inside video/audio
    ("source[src]", "src"),
];

/// What one full discovery pass recorded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Whether the document itself was recorded
    pub document: bool,

    /// DOM-referenced assets recorded
    pub dom_assets: usize,

    /// Load-timing resources recorded
    pub resources: usize,
}

impl DiscoveryReport {
    pub fn total(&self) -> usize {
        usize::from(self.document) + self.dom_assets + self.resources
    }
}

/// Collect the absolute URLs of every asset the DOM references
///
/// Identical references collapse here, before any of them reach the dedup tracker.
pub fn collect_dom_asset_urls(html: &str, page: &Url) -> HashSet<String> {
    let document = Html::parse_document(html);
    let mut urls = HashSet::new();

    for (selector, attr) in DOM_ASSET_SELECTORS {
        let selector = match Selector::parse(selector) {
            Ok(selector) => selector,
            Err(e) => {
                warn!("Invalid asset selector {}: {:?}", selector, e);
                continue;
            }
        };

        for element in document.select(&selector) {
            if let Some(url) = element
                .value()
                .attr(attr)
                .and_then(|raw| to_absolute_url(raw, page))
            {
                urls.insert(url.to_string());
            }
        }
    }

    urls
}

/// Record the HTML document itself
pub async fn discover_document(
    assembler: &ManifestAssembler,
    host: &dyn PageHost,
    manifest: &SharedManifest,
) -> Option<String> {
    let location = host.location();
    let key_override = document_key_override(location);

    assembler
        .record(
            location.as_str(),
            EntryKind::Document,
            manifest,
            key_override.as_deref(),
        )
        .await
}

/// Record every asset referenced from the DOM, concurrently
pub async fn discover_dom_assets(
    assembler: &ManifestAssembler,
    host: &dyn PageHost,
    manifest: &SharedManifest,
) -> usize {
    let Some(html) = host.document_html().await else {
        warn!("Document DOM is not available, skipping DOM-referenced assets");
        return 0;
    };

    let urls = collect_dom_asset_urls(&html, host.location());
    debug!(count = urls.len(), "Found DOM-referenced assets");

    let results = join_all(
        urls.iter()
            .map(|url| assembler.record(url, EntryKind::DomAsset, manifest, None)),
    )
    .await;

    results.into_iter().flatten().count()
}

/// Record every resource in the host's load-timing snapshot, concurrently
pub async fn discover_loaded_resources(
    assembler: &ManifestAssembler,
    host: &dyn PageHost,
    manifest: &SharedManifest,
) -> usize {
    let Some(resources) = host.resource_timing() else {
        warn!("Resource timing is not supported by this host");
        return 0;
    };

    info!("Found {} loaded resource entries", resources.len());

    let results = join_all(
        resources
            .iter()
            .map(|url| assembler.record(url, EntryKind::Resource, manifest, None)),
    )
    .await;

    results.into_iter().flatten().count()
}

/// Run all discoverers: document, then DOM assets, then load timing
pub async fn discover_all(
    assembler: &ManifestAssembler,
    host: &dyn PageHost,
    manifest: &SharedManifest,
) -> DiscoveryReport {
    let document = discover_document(assembler, host, manifest).await.is_some();
    let dom_assets = discover_dom_assets(assembler, host, manifest).await;
    let resources = discover_loaded_resources(assembler, host, manifest).await;

    DiscoveryReport {
        document,
        dom_assets,
        resources,
    }
}
