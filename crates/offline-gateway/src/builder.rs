//! # Builder for GatewayConfig
//!
//! Fluent construction of [`GatewayConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use offline_gateway::GatewayConfig;
//!
//! let config = GatewayConfig::builder()
//!     .with_origin("https://app.example.com")
//!     .expect("valid origin")
//!     .with_generation("v42")
//!     .with_request_timeout(Duration::from_secs(10))
//!     .with_fallback_path("/offline")
//!     .with_header("X-Client", "gateway")
//!     .build();
//!
//! assert_eq!(config.generation, "v42");
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::{GatewayConfig, GatewayError};

/// Builder for creating GatewayConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
        }
    }

    /// Set the origin the gateway serves
    ///
    /// Only the scheme, host and port are kept.
    pub fn with_origin(mut self, origin: impl AsRef<str>) -> Result<Self, GatewayError> {
        let parsed = Url::parse(origin.as_ref())?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(GatewayError::ConfigError(format!(
                "origin must be an http(s) URL with a host: {}",
                origin.as_ref()
            )));
        }
        self.config.origin = parsed.join("/")?;
        Ok(self)
    }

    /// Set the current cache generation
    pub fn with_generation(mut self, generation: impl Into<String>) -> Self {
        self.config.generation = generation.into();
        self
    }

    /// Set the asset manifest endpoint path
    pub fn with_manifest_path(mut self, path: impl Into<String>) -> Self {
        self.config.manifest_path = path.into();
        self
    }

    /// Set the offline fallback document path
    pub fn with_fallback_path(mut self, path: impl Into<String>) -> Self {
        self.config.fallback_path = path.into();
        self
    }

    /// Set the upper bound for every network fetch
    ///
    /// A zero timeout keeps the default; fetches are always bounded.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = if timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            timeout
        };
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.headers.insert(name, value);
        }
        self
    }

    /// Set all HTTP headers, replacing any existing headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers = headers;
        self
    }

    /// Persist the store under the given directory
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.store_dir = Some(dir.into());
        self
    }

    /// Keep the store in memory only
    pub fn with_memory_store(mut self) -> Self {
        self.config.store_dir = None;
        self
    }

    /// Set the capacity of the memory store tier in bytes
    pub fn with_max_memory_store_size(mut self, bytes: u64) -> Self {
        self.config.max_memory_store_size = bytes;
        self
    }

    /// Set how many assets are fetched concurrently during bulk population
    pub fn with_precache_concurrency(mut self, concurrency: usize) -> Self {
        self.config.precache_concurrency = concurrency.max(1);
        self
    }

    /// Enable or disable the query-stripped lookup after a cache-first miss
    pub fn with_ignore_query_on_miss(mut self, enabled: bool) -> Self {
        self.config.ignore_query_on_miss = enabled;
        self
    }

    /// Add a never-cache path pattern
    pub fn with_excluded_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.excluded_patterns.push(pattern.into());
        self
    }

    /// Replace the list of static asset extensions
    pub fn with_static_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.static_extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Build the GatewayConfig instance
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

impl Default for GatewayConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
