//! pagemanifest - content-addressable inventory of a web page's resources
//!
//! Builds a manifest of every resource a page loads (the document, assets
//! referenced from its DOM, and resources reported by load timing), with a
//! SHA-256 digest and metadata per resource, and persists it for viewers.
//!
//! # Architecture
//!
//! - Discoverers produce candidate URLs from three independent sources
//! - The assembler dedups by exact URL, fetches, hashes and records entries
//! - A live feed keeps recording resources for the lifetime of the page
//! - Writes are batched into at most one per debounce window
//!
//! # Modules
//!
//! - `adapters`: External seams (HTTP fetcher, page host, manifest store)
//! - `core`: Pipeline logic (Assembler, Discoverers, Scheduler, Rebuild)
//! - `domain`: Data structures (Manifest, Entry, key derivation)
//! - `view`: Text rendering of stored manifests
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Build and store the manifest for a page
//! pagemanifest build https://example.com/ --har example.har
//!
//! # Show the stored manifest, following updates
//! pagemanifest show --follow
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod view;

// Re-export main types at crate root for convenience
pub use adapters::{Fetcher, FileStore, ManifestStore, MemoryStore, PageHost, StaticPage};
pub use core::{PageSession, Request, Response};
pub use domain::{Entry, EntryKind, Manifest};
