//! Manifest assembly.
//!
//! The assembler owns the current manifest slot and the dedup tracker.
//! Discoverers and the live feed only ever go through [`ManifestAssembler::record`].

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};
use url::Url;

use crate::adapters::Fetcher;
use crate::domain::manifest::lock;
use crate::domain::{
    derive_key, to_absolute_url, Entry, EntryKind, Manifest, SharedManifest,
};

use super::dedup::DedupTracker;
use super::hashing::HashingService;

/// Turns discovered URLs into manifest entries
pub struct ManifestAssembler {
    page: Url,
    hasher: HashingService,
    dedup: DedupTracker,
    current: Mutex<Option<SharedManifest>>,
}

impl ManifestAssembler {
    pub fn new(page: Url, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            page,
            hasher: HashingService::new(fetcher),
            dedup: DedupTracker::new(),
            current: Mutex::new(None),
        }
    }

    /// The page this assembler inventories
    pub fn page(&self) -> &Url {
        &self.page
    }

    pub fn dedup(&self) -> &DedupTracker {
        &self.dedup
    }

    /// Record one resource into `manifest`
    ///
    /// Returns the entry key, or `None` when the URL was already claimed,
    /// does not resolve, or could not be fetched. Safe to call concurrently
    /// for many URLs; each call only writes the key derived from its own URL.
    pub async fn record(
        &self,
        url: &str,
        kind: EntryKind,
        manifest: &SharedManifest,
        key_override: Option<&str>,
    ) -> Option<String> {
        if !self.dedup.claim(url) {
            debug!(url, "Already processed, skipping");
            return None;
        }

        let Some(absolute) = to_absolute_url(url, &self.page) else {
            warn!("Skipping unresolvable resource URL: {}", url);
            return None;
        };

        let result = self.hasher.fetch_and_hash(&absolute).await?;

        let derived = derive_key(&absolute, &self.page);
        let key = key_override
            .map(str::to_string)
            .unwrap_or(derived.key);

        let entry = Entry {
            url: absolute.to_string(),
            kind,
            hash_sha256: result.hash_sha256,
            size_bytes: result.size_bytes,
            content_type: result.content_type,
            status: result.status,
            is_same_origin: derived.is_same_origin,
        };

        lock(manifest).insert(key.clone(), entry);
        Some(key)
    }

    /// Start a new manifest lifetime: clear dedup state and install an empty manifest
    pub fn install_fresh(&self) -> SharedManifest {
        self.dedup.reset();
        let manifest = Manifest::new(&self.page).shared();
        *self.slot() = Some(Arc::clone(&manifest));
        manifest
    }

    /// The current manifest, if one has been created
    pub fn current(&self) -> Option<SharedManifest> {
        self.slot().clone()
    }

    /// Whether `manifest` is still the installed one
    pub fn is_current(&self, manifest: &SharedManifest) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, manifest))
    }

    /// The current manifest, creating an empty one if none exists yet
    pub fn ensure_current(&self) -> SharedManifest {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(manifest) => Arc::clone(manifest),
            None => {
                let manifest = Manifest::new(&self.page).shared();
                *slot = Some(Arc::clone(&manifest));
                manifest
            }
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<SharedManifest>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
