//! File Store Integration Tests
//!
//! Manifests written by a session and read back by an independent viewer.

mod common;

use std::sync::Arc;

use common::{page_url, site_fetcher, PAGE_HTML};
use pagemanifest::core::DEFAULT_DEBOUNCE;
use pagemanifest::view::{render, ManifestSummary};
use pagemanifest::{FileStore, ManifestStore, PageSession, StaticPage};
use tempfile::TempDir;

#[tokio::test]
async fn test_viewer_reads_what_rebuild_stored() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(temp.path().join("store")));
    let page = StaticPage::new(page_url()).with_html(PAGE_HTML);
    let mut changes = store.subscribe();

    let session = PageSession::new(Arc::new(page), Arc::new(site_fetcher()), store.clone(), DEFAULT_DEBOUNCE);
    let outcome = session.rebuild().await;
    assert!(outcome.stored);

    // A separate reader of the same directory sees the same manifest
    let viewer_store = FileStore::new(temp.path().join("store"));
    let stored = viewer_store.load().await.unwrap().unwrap();
    assert_eq!(stored, outcome.manifest);

    // ... and in-process subscribers were told about it
    assert_eq!(changes.recv().await.unwrap(), outcome.manifest);

    let summary = ManifestSummary::of(&stored);
    assert_eq!(summary.file_count, 3);
    assert_eq!(summary.total_size, stored.entries.values().map(|e| e.size_bytes).sum::<u64>());
    assert!(render(Some(&stored)).starts_with("3 files detected"));
}

#[tokio::test]
async fn test_stored_json_shape() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(temp.path()));
    let page = StaticPage::new(page_url()).with_html(PAGE_HTML);

    let session = PageSession::new(Arc::new(page), Arc::new(site_fetcher()), store.clone(), DEFAULT_DEBOUNCE);
    session.rebuild().await;

    let raw = std::fs::read_to_string(store.manifest_path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(json["manifestVersion"], "1.0.0");
    assert_eq!(json["pageUrl"], "https://example.com/");
    assert!(json["createdAt"].as_str().unwrap().ends_with('Z'));

    let document = &json["entries"]["/index.html"];
    assert_eq!(document["kind"], "document");
    assert_eq!(document["status"], 200);
    assert_eq!(document["contentType"], "text/html; charset=utf-8");
    assert_eq!(document["hashSha256"].as_str().unwrap().len(), 64);
    assert_eq!(json["entries"]["/images/logo.png"]["kind"], "dom-asset");
}
