//! Manifest-building pipeline.
//!
//! This module contains:
//! - Hashing: fetch-and-hash of single resources
//! - Dedup: exact-URL claims for one manifest lifetime
//! - Assembler: turns URLs into manifest entries
//! - Discover: document, DOM and load-timing discoverers
//! - Live: the standing resource feed
//! - Persist: debounced writes to the store
//! - Rebuild: full rebuild controller
//! - Session: per-page wiring and the request channel

pub mod assembler;
pub mod dedup;
pub mod discover;
pub mod hashing;
pub mod live;
pub mod persist;
pub mod rebuild;
pub mod session;

// Re-export commonly used types
pub use assembler::ManifestAssembler;
pub use dedup::DedupTracker;
pub use discover::{collect_dom_asset_urls, discover_all, DiscoveryReport};
pub use hashing::{hash_bytes, HashResult, HashingService};
pub use live::{process_batch, start_live_feed};
pub use persist::{PersistenceScheduler, DEFAULT_DEBOUNCE};
pub use rebuild::{RebuildController, RebuildOutcome};
pub use session::{send_request, Envelope, PageSession, Request, RequestHandler, Response, SessionError};
