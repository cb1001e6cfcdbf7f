//! # Store Utilities
//!
//! Key normalization shared by lookups and writes.

use url::Url;

/// Normalized store key of a URL: everything but the fragment
pub fn normalize_key(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized.to_string()
}

/// Store key of a URL with its query string removed.
///
/// Returns `None` when the URL has no query to strip.
pub fn strip_query(url: &Url) -> Option<String> {
    url.query()?;
    let mut stripped = url.clone();
    stripped.set_query(None);
    stripped.set_fragment(None);
    Some(stripped.to_string())
}
