//! # Resource Classifier
//!
//! Decides whether a URL may be cached and which retrieval policy applies.
//! The same classifier gates intercepted requests, response storage and bulk
//! population, so every call site applies identical rules.

use std::collections::HashSet;

use regex::RegexSet;
use tracing::debug;
use url::Url;

use crate::{GatewayConfig, GatewayError, config::DEFAULT_EXCLUDED_PATTERNS};

/// Caching policy class of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Never read from or written to the store
    NotCacheable,
    /// Static asset, served from the store when present
    CacheFirst,
    /// Document or other same-origin resource, network preferred
    NetworkFirst,
}

impl Classification {
    pub fn is_cacheable(self) -> bool {
        !matches!(self, Classification::NotCacheable)
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Url,
    excluded: RegexSet,
    static_extensions: HashSet<String>,
}

impl Classifier {
    /// Build a classifier from the gateway configuration.
    ///
    /// The manifest endpoint is always excluded in addition to the default
    /// and configured patterns.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let manifest_pattern = format!("^{}$", regex::escape(&config.manifest_path));
        let patterns = DEFAULT_EXCLUDED_PATTERNS
            .iter()
            .map(|p| (*p).to_owned())
            .chain(std::iter::once(manifest_pattern))
            .chain(config.excluded_patterns.iter().cloned());

        let excluded = RegexSet::new(patterns)
            .map_err(|e| GatewayError::ConfigError(format!("invalid excluded pattern: {e}")))?;

        let static_extensions = config
            .static_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        Ok(Self {
            origin: config.origin.clone(),
            excluded,
            static_extensions,
        })
    }

    /// Resolve a possibly relative URL against the origin
    pub fn resolve(&self, url: &str) -> Option<Url> {
        if url.trim().is_empty() {
            return None;
        }
        self.origin.join(url).ok()
    }

    /// Classify any string; malformed input is never cacheable
    pub fn classify(&self, url: &str) -> Classification {
        match self.resolve(url) {
            Some(resolved) => self.classify_url(&resolved),
            None => {
                debug!(url = %url, "Malformed URL is not cacheable");
                Classification::NotCacheable
            }
        }
    }

    /// Classify an already parsed absolute URL
    pub fn classify_url(&self, url: &Url) -> Classification {
        if !matches!(url.scheme(), "http" | "https") || url.origin() != self.origin.origin() {
            return Classification::NotCacheable;
        }

        let path = url.path();
        if self.excluded.is_match(path) {
            return Classification::NotCacheable;
        }

        if self.has_static_extension(path) {
            Classification::CacheFirst
        } else {
            Classification::NetworkFirst
        }
    }

    fn has_static_extension(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or_default();
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.static_extensions.contains(&ext.to_ascii_lowercase())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        let config = GatewayConfig::builder()
            .with_origin("https://app.example.com")
            .unwrap()
            .build();
        Classifier::new(&config).unwrap()
    }

    #[test]
    fn test_static_assets_are_cache_first() {
        let c = classifier();
        for url in [
            "/app.js",
            "/styles/main.CSS",
            "https://app.example.com/images/logo.png",
            "/fonts/inter.woff2",
            "/data/strings.json?v=3",
        ] {
            assert_eq!(c.classify(url), Classification::CacheFirst, "{url}");
        }
    }

    #[test]
    fn test_documents_are_network_first() {
        let c = classifier();
        for url in ["/", "/offline", "/read/feeds", "https://app.example.com/me?tab=1"] {
            assert_eq!(c.classify(url), Classification::NetworkFirst, "{url}");
        }
    }

    #[test]
    fn test_cross_origin_is_not_cacheable() {
        let c = classifier();
        assert_eq!(
            c.classify("https://cdn.example.com/app.js"),
            Classification::NotCacheable
        );
        assert_eq!(
            c.classify("http://app.example.com/app.js"),
            Classification::NotCacheable
        );
        assert_eq!(
            c.classify("https://app.example.com:8443/app.js"),
            Classification::NotCacheable
        );
    }

    #[test]
    fn test_internal_paths_are_not_cacheable() {
        let c = classifier();
        for url in [
            "/service-worker.js",
            "/__webpack_hmr",
            "/socket.io/?EIO=3",
            "/version",
            "/api/version/check",
            "/assets-manifest",
            "/images/flags/fr.svg",
        ] {
            assert_eq!(c.classify(url), Classification::NotCacheable, "{url}");
        }
    }

    #[test]
    fn test_malformed_urls_are_not_cacheable() {
        let c = classifier();
        assert_eq!(c.classify(""), Classification::NotCacheable);
        assert_eq!(c.classify("http://[::1"), Classification::NotCacheable);
        assert_eq!(c.classify("data:text/plain,hi"), Classification::NotCacheable);
    }

    #[test]
    fn test_configured_exclusions() {
        let config = GatewayConfig::builder()
            .with_origin("https://app.example.com")
            .unwrap()
            .with_excluded_pattern(r"^/live/")
            .build();
        let c = Classifier::new(&config).unwrap();
        assert_eq!(c.classify("/live/feed.json"), Classification::NotCacheable);
        assert_eq!(c.classify("/static/feed.json"), Classification::CacheFirst);

        let bad = GatewayConfig::builder().with_excluded_pattern("(").build();
        assert!(Classifier::new(&bad).is_err());
    }

    #[test]
    fn test_dotfiles_are_not_static() {
        let c = classifier();
        assert_eq!(c.classify("/.js"), Classification::NetworkFirst);
    }
}
