//! The page manifest and its entries.
//!
//! This is the wire/storage format consumed by viewers, so field names are
//! camelCase and `createdAt` uses the millisecond ISO-8601 form.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// Current manifest schema version
pub const MANIFEST_VERSION: &str = "1.0.0";

/// A manifest shared between the rebuild controller, discoverers and the live feed
pub type SharedManifest = Arc<Mutex<Manifest>>;

/// Types of resources that can be collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    /// The HTML document itself
    Document,

    /// An asset referenced from the DOM (icon, stylesheet, image, script, media)
    DomAsset,

    /// A resource reported by the load-timing feed
    Resource,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::DomAsset => "dom-asset",
            Self::Resource => "resource",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single resource entry in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Absolute URL of the resource
    pub url: String,

    pub kind: EntryKind,

    /// SHA-256 of the fetched bytes (64 lowercase hex chars)
    pub hash_sha256: String,

    pub size_bytes: u64,

    /// Value of the Content-Type response header, if any
    pub content_type: Option<String>,

    /// HTTP status of the fetch
    pub status: u16,

    pub is_same_origin: bool,
}

/// The complete page manifest with all collected resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub manifest_version: String,

    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,

    pub page_url: String,

    pub origin: String,

    /// Entries keyed by entry key, in insertion order
    pub entries: IndexMap<String, Entry>,
}

impl Manifest {
    /// Create a new empty manifest for a page
    pub fn new(page: &Url) -> Self {
        Self {
            manifest_version: MANIFEST_VERSION.to_string(),
            // Stored form keeps milliseconds only
            created_at: Utc::now().trunc_subsecs(3),
            page_url: page.as_str().to_string(),
            origin: page.origin().ascii_serialization(),
            entries: IndexMap::new(),
        }
    }

    /// Wrap this manifest for sharing between tasks
    pub fn shared(self) -> SharedManifest {
        Arc::new(Mutex::new(self))
    }

    /// Insert an entry, replacing any previous entry under the same key
    pub fn insert(&mut self, key: String, entry: Entry) -> Option<Entry> {
        self.entries.insert(key, entry)
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entries' sizes
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }
}

/// Lock a shared manifest, recovering the data if a holder panicked
pub fn lock(manifest: &SharedManifest) -> MutexGuard<'_, Manifest> {
    manifest.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Take a point-in-time copy of a shared manifest
pub fn snapshot(manifest: &SharedManifest) -> Manifest {
    lock(manifest).clone()
}

/// `createdAt` is written the way browsers write `Date.toISOString()`
mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
