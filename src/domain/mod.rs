//! Domain types for page manifests.
//!
//! This module contains the core data structures:
//! - Manifest and Entry: the persisted inventory
//! - Key derivation: URL to manifest key

pub mod key;
pub mod manifest;

// Re-export commonly used types
pub use key::{derive_key, document_key_override, to_absolute_url, EntryKey, INDEX_KEY, ROOT_KEY};
pub use manifest::{Entry, EntryKind, Manifest, SharedManifest, MANIFEST_VERSION};
