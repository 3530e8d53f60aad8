//! Text rendering of a manifest snapshot.
//!
//! Shows an empty state when there is nothing to show, otherwise entries
//! sorted by key with the aggregate count and size.

use chrono::Local;

use crate::domain::{Entry, Manifest};

/// Shown when no manifest exists or it has no entries
pub const EMPTY_STATE: &str =
    "No manifest data available.\nNavigate to a page and wait for resources to load.";

/// Aggregate view of a manifest
#[derive(Debug, Clone)]
pub struct ManifestSummary<'a> {
    pub file_count: usize,
    pub total_size: u64,
    /// Entries sorted lexicographically by key
    pub entries: Vec<(&'a str, &'a Entry)>,
}

impl<'a> ManifestSummary<'a> {
    pub fn of(manifest: &'a Manifest) -> Self {
        let mut entries: Vec<(&str, &Entry)> = manifest
            .entries
            .iter()
            .map(|(key, entry)| (key.as_str(), entry))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        Self {
            file_count: entries.len(),
            total_size: manifest.total_size(),
            entries,
        }
    }
}

/// Format bytes to a human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Render a manifest (or its absence) as plain text
pub fn render(manifest: Option<&Manifest>) -> String {
    let Some(manifest) = manifest.filter(|m| !m.is_empty()) else {
        return EMPTY_STATE.to_string();
    };

    let summary = ManifestSummary::of(manifest);
    let mut out = format!(
        "{} files detected · {} total · {}\n{}\n",
        summary.file_count,
        format_bytes(summary.total_size),
        manifest
            .created_at
            .with_timezone(&Local)
            .format("%H:%M:%S"),
        manifest.page_url
    );

    for (key, entry) in &summary.entries {
        out.push_str(&format!(
            "\n{}\n  {}\n  {:<10} {:>10}  {}\n",
            key,
            entry.hash_sha256,
            entry.kind.as_str(),
            format_bytes(entry.size_bytes),
            entry.content_type.as_deref().unwrap_or("unknown")
        ));
    }

    out
}
