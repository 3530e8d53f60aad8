//! Debounced manifest persistence.
//!
//! The first request in an idle period arms a single-shot timer; requests
//! arriving before it fires only swap the pending manifest and never push the
//! timer back. At most one write per window, always of the latest manifest.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error};

use crate::adapters::ManifestStore;
use crate::domain::manifest::snapshot;
use crate::domain::{Manifest, SharedManifest};

/// Default batching window
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Pending {
    manifest: Option<SharedManifest>,
    armed: bool,
}

struct Inner {
    store: Arc<dyn ManifestStore>,
    window: Duration,
    state: Mutex<Pending>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, Pending> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Batches persistence requests into at most one write per window
#[derive(Clone)]
pub struct PersistenceScheduler {
    inner: Arc<Inner>,
}

impl PersistenceScheduler {
    pub fn new(store: Arc<dyn ManifestStore>, window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                window,
                state: Mutex::new(Pending::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn ManifestStore> {
        &self.inner.store
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Whether a write is currently scheduled
    pub fn is_armed(&self) -> bool {
        self.inner.state().armed
    }

    /// Request a write of `manifest` within the current window
    pub fn schedule(&self, manifest: SharedManifest) {
        let arm = {
            let mut state = self.inner.state();
            state.manifest = Some(manifest);
            !std::mem::replace(&mut state.armed, true)
        };

        if !arm {
            return;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;

            let pending = {
                let mut state = inner.state();
                state.armed = false;
                state.manifest.take()
            };

            if let Some(manifest) = pending {
                let manifest = snapshot(&manifest);
                debug!(entries = manifest.len(), "Writing batched manifest update");
                persist(inner.store.as_ref(), &manifest).await;
            }
        });
    }

    /// Drop the pending manifest, if any
    ///
    /// An armed timer stays armed; when it fires with nothing pending it
    /// writes nothing. Returns whether anything was dropped.
    pub fn discard_pending(&self) -> bool {
        self.inner.state().manifest.take().is_some()
    }

    /// Write `manifest` immediately, bypassing the window
    pub async fn persist_now(&self, manifest: &Manifest) -> bool {
        persist(self.inner.store.as_ref(), manifest).await
    }

    /// Write any pending manifest now instead of waiting for the timer
    pub async fn flush(&self) -> bool {
        let pending = self.inner.state().manifest.take();
        match pending {
            Some(manifest) => self.persist_now(&snapshot(&manifest)).await,
            None => false,
        }
    }
}

/// Save a manifest; failures are logged and swallowed
async fn persist(store: &dyn ManifestStore, manifest: &Manifest) -> bool {
    match store.save(manifest).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to store manifest: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, StoreError};
    use crate::domain::manifest::lock;
    use crate::domain::{Entry, EntryKind};
    use async_trait::async_trait;
    use tokio::sync::broadcast;
    use url::Url;

    fn manifest() -> SharedManifest {
        Manifest::new(&Url::parse("https://example.com/").unwrap()).shared()
    }

    fn add_entry(manifest: &SharedManifest, key: &str) {
        lock(manifest).insert(
            key.to_string(),
            Entry {
                url: format!("https://example.com{}", key),
                kind: EntryKind::Resource,
                hash_sha256: "0".repeat(64),
                size_bytes: 1,
                content_type: None,
                status: 200,
                is_same_origin: true,
            },
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_written_once() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = PersistenceScheduler::new(store.clone(), DEFAULT_DEBOUNCE);
        let manifest = manifest();

        for key in ["/a", "/b", "/c"] {
            add_entry(&manifest, key);
            scheduler.schedule(Arc::clone(&manifest));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(store.write_count(), 0);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.write_count(), 1);
        assert_eq!(store.current().unwrap().len(), 3);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_is_not_reset_by_later_requests() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = PersistenceScheduler::new(store.clone(), DEFAULT_DEBOUNCE);
        let manifest = manifest();

        scheduler.schedule(Arc::clone(&manifest));
        tokio::time::sleep(Duration::from_millis(90)).await;
        scheduler.schedule(Arc::clone(&manifest));
        tokio::time::sleep(Duration::from_millis(15)).await;

        // Fired 100ms after the first request, not after the second
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_manifest_wins() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = PersistenceScheduler::new(store.clone(), DEFAULT_DEBOUNCE);
        let old = manifest();
        let new = manifest();
        add_entry(&new, "/fresh");

        scheduler.schedule(old);
        scheduler.schedule(new);
        tokio::time::sleep(Duration::from_millis(150)).await;

        let stored = store.current().unwrap();
        assert!(stored.get("/fresh").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_write_separately() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = PersistenceScheduler::new(store.clone(), DEFAULT_DEBOUNCE);
        let manifest = manifest();

        scheduler.schedule(Arc::clone(&manifest));
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.schedule(Arc::clone(&manifest));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_pending() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = PersistenceScheduler::new(store.clone(), DEFAULT_DEBOUNCE);

        assert!(!scheduler.flush().await);
        scheduler.schedule(manifest());
        assert!(scheduler.flush().await);
        assert_eq!(store.write_count(), 1);

        // The timer finds nothing left to write
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discarded_manifest_is_not_written() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = PersistenceScheduler::new(store.clone(), DEFAULT_DEBOUNCE);

        assert!(!scheduler.discard_pending());
        scheduler.schedule(manifest());
        assert!(scheduler.discard_pending());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.write_count(), 0);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_discard_rides_the_armed_timer() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = PersistenceScheduler::new(store.clone(), DEFAULT_DEBOUNCE);
        let replacement = manifest();
        add_entry(&replacement, "/after");

        scheduler.schedule(manifest());
        tokio::time::sleep(Duration::from_millis(40)).await;
        scheduler.discard_pending();
        scheduler.schedule(Arc::clone(&replacement));

        // Fires 100ms after the first request
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(store.write_count(), 1);
        assert!(store.current().unwrap().get("/after").is_some());
    }

    struct BrokenStore;

    #[async_trait]
    impl ManifestStore for BrokenStore {
        async fn save(&self, _manifest: &Manifest) -> Result<(), StoreError> {
            Err(StoreError::Task("disk full".to_string()))
        }

        async fn load(&self) -> Result<Option<Manifest>, StoreError> {
            Ok(None)
        }

        fn subscribe(&self) -> broadcast::Receiver<Manifest> {
            broadcast::channel(1).1
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let scheduler = PersistenceScheduler::new(Arc::new(BrokenStore), DEFAULT_DEBOUNCE);
        let manifest = Manifest::new(&Url::parse("https://example.com/").unwrap());

        assert!(!scheduler.persist_now(&manifest).await);
    }
}
