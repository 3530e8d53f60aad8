//! Manifest key derivation.
//!
//! Same-origin resources are addressed by path within the site; cross-origin
//! resources keep their full URL so entries from different hosts never meet.

use url::Url;

/// Key used for the document itself when the page sits at the site root
pub const INDEX_KEY: &str = "/index.html";

/// Key used when a same-origin URL has neither path nor query
pub const ROOT_KEY: &str = "/";

/// A derived manifest key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryKey {
    pub key: String,
    pub is_same_origin: bool,
}

/// Derive the manifest key for an absolute URL seen from `page`
pub fn derive_key(url: &Url, page: &Url) -> EntryKey {
    let is_same_origin = url.origin() == page.origin();

    let key = if is_same_origin {
        let search = match url.query() {
            Some(q) if !q.is_empty() => format!("?{}", q),
            _ => String::new(),
        };
        let key = format!("{}{}", url.path(), search);
        if key.is_empty() {
            ROOT_KEY.to_string()
        } else {
            key
        }
    } else {
        url.as_str().to_string()
    };

    EntryKey {
        key,
        is_same_origin,
    }
}

/// Resolve a possibly relative reference against the page URL
///
/// Returns `None` for empty references and anything that does not parse.
pub fn to_absolute_url(raw: &str, page: &Url) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    page.join(raw).ok()
}

/// Key override for the document entry: the root path reads better as `/index.html`
pub fn document_key_override(page: &Url) -> Option<String> {
    match page.path() {
        "" | "/" => Some(INDEX_KEY.to_string()),
        _ => None,
    }
}
