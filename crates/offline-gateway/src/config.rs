use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("offline-gateway/", env!("CARGO_PKG_VERSION"));

/// Bound applied to network fetches when none is configured
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Static asset extensions served cache-first
pub const DEFAULT_STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf",
    "otf", "eot", "json",
];

/// Paths that must always be observed fresh
pub const DEFAULT_EXCLUDED_PATTERNS: &[&str] = &[
    r"service-worker\.js$",
    r"__webpack_hmr$",
    r"^/socket\.io/",
    r"/version",
    r"/flags/",
];

/// Configurable options for the gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Origin every relative URL is resolved against; only same-origin URLs are cached
    pub origin: Url,

    /// Current cache generation, stable for the lifetime of a deployed build
    pub generation: String,

    /// Path of the asset manifest endpoint
    pub manifest_path: String,

    /// Path of the document served to offline navigations
    pub fallback_path: String,

    /// Upper bound for every network fetch issued by the gateway; never zero
    pub request_timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Directory of the persistent store tier; memory only when unset
    pub store_dir: Option<PathBuf>,

    /// Capacity of the memory store tier in bytes
    pub max_memory_store_size: u64,

    /// Number of assets fetched concurrently during bulk population
    pub precache_concurrency: usize,

    /// Retry a failed cache-first lookup without the query string
    pub ignore_query_on_miss: bool,

    /// Additional never-cache path patterns (regular expressions)
    pub excluded_patterns: Vec<String>,

    /// Extensions classified as static assets
    pub static_extensions: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:3000/").expect("static origin is valid"),
            generation: "v1".to_owned(),
            manifest_path: "/assets-manifest".to_owned(),
            fallback_path: "/offline".to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: GatewayConfig::get_default_headers(),
            store_dir: None,
            max_memory_store_size: 30 * 1024 * 1024, // 30MB
            precache_concurrency: 4,
            ignore_query_on_miss: true,
            excluded_patterns: Vec::new(),
            static_extensions: DEFAULT_STATIC_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_owned())
                .collect(),
        }
    }
}

impl GatewayConfig {
    pub fn builder() -> crate::builder::GatewayConfigBuilder {
        crate::builder::GatewayConfigBuilder::new()
    }

    /// Absolute URL of the manifest endpoint
    pub fn manifest_url(&self) -> crate::Result<Url> {
        Ok(self.origin.join(&self.manifest_path)?)
    }

    /// Absolute URL of the offline fallback document
    pub fn fallback_url(&self) -> crate::Result<Url> {
        Ok(self.origin.join(&self.fallback_path)?)
    }

    pub fn get_default_headers() -> HeaderMap {
        // Accept-Encoding is left to reqwest so bodies are stored decoded
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );

        default_headers
    }
}
