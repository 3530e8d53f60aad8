//! Full manifest rebuilds.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::adapters::PageHost;
use crate::domain::manifest::snapshot;
use crate::domain::Manifest;

use super::assembler::ManifestAssembler;
use super::discover::{discover_all, DiscoveryReport};
use super::persist::PersistenceScheduler;

/// Outcome of one rebuild
#[derive(Debug, Clone)]
pub struct RebuildOutcome {
    /// The manifest as it stood when discovery finished
    pub manifest: Manifest,

    pub report: DiscoveryReport,

    /// Whether the final write reached the store
    pub stored: bool,
}

/// Runs full rebuilds: fresh dedup state, fresh manifest, all discoverers
///
/// Rebuilds are serialized: a request arriving while another rebuild is in
/// flight waits for it to finish and then runs its own full pass.
pub struct RebuildController {
    assembler: Arc<ManifestAssembler>,
    host: Arc<dyn PageHost>,
    scheduler: PersistenceScheduler,
    gate: Mutex<()>,
}

impl RebuildController {
    pub fn new(
        assembler: Arc<ManifestAssembler>,
        host: Arc<dyn PageHost>,
        scheduler: PersistenceScheduler,
    ) -> Self {
        Self {
            assembler,
            host,
            scheduler,
            gate: Mutex::new(()),
        }
    }

    /// Rebuild the manifest from scratch and persist it
    ///
    /// The final write skips the debounce window; this is the authoritative
    /// full result. Store failures are logged, not returned.
    #[instrument(skip(self), fields(page = %self.assembler.page()))]
    pub async fn rebuild(&self) -> RebuildOutcome {
        let _gate = self.gate.lock().await;

        let manifest = self.assembler.install_fresh();
        let report = discover_all(&self.assembler, self.host.as_ref(), &manifest).await;

        // Anything pending is either a replaced manifest or already in this snapshot
        if self.scheduler.discard_pending() {
            debug!("Dropped pending write superseded by rebuild");
        }

        let manifest = snapshot(&manifest);
        info!(
            entries = manifest.len(),
            total_bytes = manifest.total_size(),
            "Page manifest built"
        );

        let stored = self.scheduler.persist_now(&manifest).await;
        if stored {
            info!("Manifest stored");
        }

        RebuildOutcome {
            manifest,
            report,
            stored,
        }
    }
}
