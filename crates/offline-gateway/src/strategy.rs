//! # Fetch Strategy Engine
//!
//! The two retrieval policies and their interaction with the version store
//! and the network. Store failures never surface from here: a failed read is
//! a miss and a failed write is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::classifier::{Classification, Classifier};
use crate::network::{Network, NetworkResponse, fetch_with_timeout};
use crate::store::{StoreHandle, StoredResponse, normalize_key, strip_query};
use crate::{GatewayConfig, GatewayError};

/// Where a response handed back by the gateway came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Fallback,
}

/// Response produced for an intercepted request
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub url: String,
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl GatewayResponse {
    fn from_network(response: NetworkResponse) -> Self {
        Self {
            url: response.url.to_string(),
            status: response.status,
            headers: response.headers,
            body: response.body,
            source: ResponseSource::Network,
        }
    }

    fn from_stored(entry: StoredResponse, source: ResponseSource) -> Self {
        Self {
            url: entry.metadata.url,
            status: StatusCode::from_u16(entry.metadata.status).unwrap_or(StatusCode::OK),
            headers: entry.metadata.headers,
            body: entry.body,
            source,
        }
    }
}

pub struct FetchEngine {
    classifier: Arc<Classifier>,
    network: Arc<dyn Network>,
    timeout: Duration,
    ignore_query_on_miss: bool,
}

impl FetchEngine {
    pub fn new(
        config: &GatewayConfig,
        classifier: Arc<Classifier>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            classifier,
            network,
            timeout: config.request_timeout,
            ignore_query_on_miss: config.ignore_query_on_miss,
        }
    }

    /// Run the policy matching `classification`.
    ///
    /// `fallback` is only consulted by network-first, and only for navigations.
    pub async fn fetch(
        &self,
        store: &StoreHandle,
        url: &Url,
        classification: Classification,
        fallback: Option<&Url>,
    ) -> Result<GatewayResponse, GatewayError> {
        match classification {
            Classification::CacheFirst => self.cache_first(store, url).await,
            Classification::NetworkFirst => self.network_first(store, url, fallback).await,
            Classification::NotCacheable => {
                let response = fetch_with_timeout(self.network.as_ref(), url, self.timeout).await?;
                Ok(GatewayResponse::from_network(response))
            }
        }
    }

    /// Serve from the store when present, network only on a miss
    pub async fn cache_first(
        &self,
        store: &StoreHandle,
        url: &Url,
    ) -> Result<GatewayResponse, GatewayError> {
        let key = normalize_key(url);
        if let Some(entry) = self.lookup(store, &key).await {
            debug!(url = %url, generation = %store.generation(), "Cache hit");
            return Ok(GatewayResponse::from_stored(entry, ResponseSource::Cache));
        }

        debug!(url = %url, "Cache miss, fetching from network");
        let failure = match fetch_with_timeout(self.network.as_ref(), url, self.timeout).await {
            Ok(response) if response.is_success() => {
                self.store_response(store, url, &key, &response).await;
                return Ok(GatewayResponse::from_network(response));
            }
            Ok(response) => Ok(response),
            Err(e) => Err(e),
        };

        if self.ignore_query_on_miss {
            if let Some(stripped) = strip_query(url) {
                if let Some(entry) = self.lookup(store, &stripped).await {
                    debug!(url = %url, key = %stripped, "Serving cached entry without query string");
                    return Ok(GatewayResponse::from_stored(entry, ResponseSource::Cache));
                }
            }
        }

        failure.map(GatewayResponse::from_network)
    }

    /// Prefer the live network, fall back to the store and then to the
    /// fallback document
    pub async fn network_first(
        &self,
        store: &StoreHandle,
        url: &Url,
        fallback: Option<&Url>,
    ) -> Result<GatewayResponse, GatewayError> {
        let key = normalize_key(url);

        let error = match fetch_with_timeout(self.network.as_ref(), url, self.timeout).await {
            Ok(response) if response.is_success() => {
                self.store_response(store, url, &key, &response).await;
                return Ok(GatewayResponse::from_network(response));
            }
            Ok(response) => {
                // The origin answered, so only an exact cached copy may replace it
                if let Some(entry) = self.lookup(store, &key).await {
                    debug!(url = %url, status = %response.status, "Serving cached entry over error status");
                    return Ok(GatewayResponse::from_stored(entry, ResponseSource::Cache));
                }
                return Ok(GatewayResponse::from_network(response));
            }
            Err(e) => e,
        };

        debug!(url = %url, error = %error, "Network failed, falling back to store");

        if let Some(entry) = self.lookup(store, &key).await {
            return Ok(GatewayResponse::from_stored(entry, ResponseSource::Cache));
        }

        if let Some(fallback) = fallback {
            if let Some(entry) = self.lookup(store, &normalize_key(fallback)).await {
                debug!(url = %url, fallback = %fallback, "Serving fallback document");
                return Ok(GatewayResponse::from_stored(entry, ResponseSource::Fallback));
            }
        }

        Err(error)
    }

    async fn lookup(&self, store: &StoreHandle, key: &str) -> Option<StoredResponse> {
        match store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Store read failed, treating as miss");
                None
            }
        }
    }

    /// Store a successful response if both the requested and the final URL
    /// are still cacheable
    async fn store_response(
        &self,
        store: &StoreHandle,
        url: &Url,
        key: &str,
        response: &NetworkResponse,
    ) {
        if !self.classifier.classify_url(url).is_cacheable()
            || !self.classifier.classify_url(&response.url).is_cacheable()
        {
            debug!(url = %url, final_url = %response.url, "Response is not cacheable, not storing");
            return;
        }

        if let Err(e) = store.put(key, StoredResponse::from_network(key, response)).await {
            warn!(url = %url, error = %e, "Store write failed, dropping");
        }
    }
}
