//! # Manifest Synchronizer
//!
//! Detects new deployments by comparing the hash of the server's asset
//! manifest with the last one observed by this process.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::network::{Network, fetch_with_timeout};
use crate::{GatewayConfig, GatewayError};

/// Server-declared list of build assets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub hash: String,
    #[serde(default)]
    pub assets: Vec<String>,
}

/// Result of one synchronization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub assets: Vec<String>,
    pub changed: bool,
}

impl SyncOutcome {
    fn unchanged() -> Self {
        Self::default()
    }
}

pub struct ManifestSynchronizer {
    endpoint: Url,
    timeout: Duration,
    /// Best effort; lost on restart, which makes the next sync report a change
    last_known_hash: Mutex<Option<String>>,
}

impl ManifestSynchronizer {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            endpoint: config.manifest_url()?,
            timeout: config.request_timeout,
            last_known_hash: Mutex::new(None),
        })
    }

    pub fn last_known_hash(&self) -> Option<String> {
        self.last_known_hash.lock().clone()
    }

    /// Forget the observed hash, as a process restart would
    pub fn reset(&self) {
        *self.last_known_hash.lock() = None;
    }

    /// Fetch the manifest and report whether it changed.
    ///
    /// Never fails: a fetch or parse error is logged and reported as
    /// unchanged, leaving the last known hash untouched.
    pub async fn sync(&self, network: &dyn Network) -> SyncOutcome {
        let manifest = match self.fetch(network).await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Manifest sync failed, assuming unchanged");
                return SyncOutcome::unchanged();
            }
        };

        let mut last_known = self.last_known_hash.lock();
        if last_known.as_deref() == Some(manifest.hash.as_str()) {
            debug!(hash = %manifest.hash, "Manifest unchanged");
            return SyncOutcome::unchanged();
        }

        info!(
            previous = ?*last_known,
            hash = %manifest.hash,
            assets = manifest.assets.len(),
            "Manifest changed"
        );
        *last_known = Some(manifest.hash);

        SyncOutcome {
            assets: manifest.assets,
            changed: true,
        }
    }

    async fn fetch(&self, network: &dyn Network) -> Result<AssetManifest, GatewayError> {
        let response = fetch_with_timeout(network, &self.endpoint, self.timeout).await?;
        if !response.is_success() {
            return Err(GatewayError::StatusCode {
                url: self.endpoint.to_string(),
                status: response.status,
            });
        }
        Ok(serde_json::from_slice(&response.body)?)
    }
}
