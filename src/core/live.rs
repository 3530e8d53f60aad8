//! Live discovery feed.
//!
//! A standing subscription to the host's resource-load notifications,
//! started once per page and left running across rebuilds.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::PageHost;
use crate::domain::manifest::lock;
use crate::domain::EntryKind;

use super::assembler::ManifestAssembler;
use super::persist::PersistenceScheduler;

/// Subscribe to the host's live feed and record everything it reports
///
/// Returns `None` when the host offers no live feed.
pub fn start_live_feed(
    assembler: Arc<ManifestAssembler>,
    host: &dyn PageHost,
    scheduler: PersistenceScheduler,
) -> Option<JoinHandle<()>> {
    let Some(mut feed) = host.observe_resources() else {
        warn!("Live resource feed is not available on this host");
        return None;
    };

    Some(tokio::spawn(async move {
        while let Some(batch) = feed.recv().await {
            process_batch(&assembler, &scheduler, batch).await;
        }
        debug!("Live resource feed closed");
    }))
}

/// Record one notification batch, strictly in order
///
/// Entries are awaited one at a time so that no two of them race to create
/// or replace the current manifest. Returns the number of new entries.
pub async fn process_batch(
    assembler: &ManifestAssembler,
    scheduler: &PersistenceScheduler,
    batch: Vec<String>,
) -> usize {
    let mut recorded = 0;

    for url in batch {
        let manifest = assembler.ensure_current();
        let Some(key) = assembler
            .record(&url, EntryKind::Resource, &manifest, None)
            .await
        else {
            continue;
        };

        // A rebuild may have replaced the manifest while the fetch was in flight
        if !assembler.is_current(&manifest) {
            debug!(%url, "Manifest was replaced, dropping entry");
            continue;
        }

        let entry = lock(&manifest).get(&key).cloned();
        if let Some(entry) = entry {
            info!(key = %key, url = %entry.url, hash = %entry.hash_sha256, "New resource discovered");
            scheduler.schedule(Arc::clone(&manifest));
            recorded += 1;
        }
    }

    recorded
}
