//! Durable manifest storage.
//!
//! A store holds exactly one value under [`STORAGE_KEY`]. Writes replace the
//! whole manifest and are announced to subscribers, which is how viewers
//! follow live updates.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fs2::FileExt;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, Debouncer};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::domain::Manifest;

/// Key under which the manifest is stored
pub const STORAGE_KEY: &str = "pageManifest";

const CHANGE_CAPACITY: usize = 16;

/// Errors that can occur with a manifest store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Async single-key store for the page manifest
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Replace the stored manifest
    async fn save(&self, manifest: &Manifest) -> Result<(), StoreError>;

    /// Load the stored manifest, if any
    async fn load(&self) -> Result<Option<Manifest>, StoreError>;

    /// Subscribe to values written through this store
    fn subscribe(&self) -> broadcast::Receiver<Manifest>;
}

/// JSON file store (`<dir>/pageManifest.json`)
pub struct FileStore {
    dir: PathBuf,
    changes: broadcast::Sender<Manifest>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            dir: dir.into(),
            changes,
        }
    }

    /// Open the store in the configured location
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(Self::new(crate::config::store_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the stored manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", STORAGE_KEY))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!(".{}.lock", STORAGE_KEY))
    }

    /// Follow changes made on disk, including by other processes
    pub fn watch(&self) -> Result<StoreWatch, StoreError> {
        std::fs::create_dir_all(&self.dir)?;

        let (fs_tx, fs_rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(Duration::from_millis(200), fs_tx)?;
        debouncer
            .watcher()
            .watch(&self.dir, RecursiveMode::NonRecursive)?;

        let (tx, rx) = mpsc::channel(CHANGE_CAPACITY);
        let manifest_path = self.manifest_path();

        // Ends once the debouncer is dropped and its sender goes with it
        std::thread::spawn(move || {
            while let Ok(result) = fs_rx.recv() {
                let events = match result {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("Store watch error: {:?}", e);
                        continue;
                    }
                };

                if !events.iter().any(|event| event.path == manifest_path) {
                    continue;
                }

                match read_manifest(&manifest_path) {
                    Ok(Some(manifest)) => {
                        if tx.blocking_send(manifest).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Failed to read changed manifest: {}", e),
                }
            }
        });

        Ok(StoreWatch {
            changes: rx,
            _debouncer: debouncer,
        })
    }
}

#[async_trait]
impl ManifestStore for FileStore {
    async fn save(&self, manifest: &Manifest) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(manifest)?;
        let dir = self.dir.clone();
        let path = self.manifest_path();
        let lock_path = self.lock_path();

        tokio::task::spawn_blocking(move || write_locked(&dir, &path, &lock_path, &json))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        let _ = self.changes.send(manifest.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Manifest>, StoreError> {
        let path = self.manifest_path();
        tokio::task::spawn_blocking(move || read_manifest(&path))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn subscribe(&self) -> broadcast::Receiver<Manifest> {
        self.changes.subscribe()
    }
}

/// Write via a temp file and rename, holding an exclusive lock
fn write_locked(dir: &Path, path: &Path, lock_path: &Path, json: &[u8]) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir)?;

    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;
    lock.lock_exclusive()?;

    let tmp_path = path.with_extension("json.tmp");
    let result = (|| -> Result<(), StoreError> {
        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(json)?;
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    lock.unlock()?;
    result
}

fn read_manifest(path: &Path) -> Result<Option<Manifest>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Stream of manifests written to a [`FileStore`] directory
pub struct StoreWatch {
    changes: mpsc::Receiver<Manifest>,
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl StoreWatch {
    /// Wait for the next stored manifest; `None` once watching has stopped
    pub async fn next(&mut self) -> Option<Manifest> {
        self.changes.recv().await
    }
}

/// In-memory store
pub struct MemoryStore {
    value: Mutex<Option<Manifest>>,
    writes: AtomicUsize,
    changes: broadcast::Sender<Manifest>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            value: Mutex::new(None),
            writes: AtomicUsize::new(0),
            changes,
        }
    }

    /// Number of successful `save` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// The currently stored manifest
    pub fn current(&self) -> Option<Manifest> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ManifestStore for MemoryStore {
    async fn save(&self, manifest: &Manifest) -> Result<(), StoreError> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(manifest.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        let _ = self.changes.send(manifest.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Manifest>, StoreError> {
        Ok(self.current())
    }

    fn subscribe(&self) -> broadcast::Receiver<Manifest> {
        self.changes.subscribe()
    }
}
