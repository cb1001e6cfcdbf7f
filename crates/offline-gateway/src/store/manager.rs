//! # Version Store
//!
//! Coordinates the memory and file tiers and hands out per-generation handles.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use tracing::{debug, info, warn};
use url::Url;

use crate::GatewayConfig;
use crate::network::{Network, fetch_with_timeout};
use crate::store::providers::{FileStore, MemoryStore, StoreProvider};
use crate::store::types::{
    EntryKey, PopulateReport, StoreLookupResult, StoreResult, StoredResponse,
};
use crate::store::utils::normalize_key;

/// Generation-namespaced response store with a memory tier in front of an
/// optional persistent file tier
pub struct VersionStore {
    memory: MemoryStore,
    file: Option<FileStore>,
    request_timeout: Duration,
    concurrency: usize,
}

impl VersionStore {
    pub fn new(config: &GatewayConfig) -> Self {
        let file = config.store_dir.clone().map(FileStore::new);
        if file.is_none() {
            debug!("No store directory configured, store is memory only");
        }

        Self {
            memory: MemoryStore::new(config.max_memory_store_size),
            file,
            request_timeout: config.request_timeout,
            concurrency: config.precache_concurrency.max(1),
        }
    }

    /// Open a handle on `generation`, creating it if needed
    pub async fn open(self: &Arc<Self>, generation: impl Into<String>) -> StoreResult<StoreHandle> {
        let handle = self.handle(generation);
        self.memory.open_generation(&handle.generation).await?;
        if let Some(file) = &self.file {
            file.open_generation(&handle.generation).await?;
        }
        Ok(handle)
    }

    /// Handle on `generation` without touching storage; writes create it lazily
    pub fn handle(self: &Arc<Self>, generation: impl Into<String>) -> StoreHandle {
        StoreHandle {
            store: Arc::clone(self),
            generation: generation.into(),
        }
    }

    /// Every generation held by any tier
    pub async fn list_generations(&self) -> StoreResult<BTreeSet<String>> {
        let mut generations = self.memory.list_generations().await?;
        if let Some(file) = &self.file {
            generations.extend(file.list_generations().await?);
        }
        Ok(generations)
    }

    /// Delete a generation from every tier
    pub async fn delete_generation(&self, generation: &str) -> StoreResult<()> {
        let mem_result = self.memory.delete_generation(generation).await;
        let file_result = match &self.file {
            Some(file) => file.delete_generation(generation).await,
            None => Ok(()),
        };

        file_result.and(mem_result)
    }

    async fn get(&self, key: &EntryKey) -> StoreLookupResult {
        if let Some(entry) = self.memory.get(key).await? {
            return Ok(Some(entry));
        }

        let Some(file) = &self.file else {
            return Ok(None);
        };

        if let Some(entry) = file.get(key).await? {
            // Promote for faster access next time
            let _ = self.memory.put(key.clone(), entry.clone()).await;
            return Ok(Some(entry));
        }

        Ok(None)
    }

    async fn put(&self, key: EntryKey, entry: StoredResponse) -> StoreResult<()> {
        let _ = self.memory.put(key.clone(), entry.clone()).await;

        match &self.file {
            Some(file) => file.put(key, entry).await,
            None => Ok(()),
        }
    }
}

/// Handle on one generation of a [`VersionStore`]
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<VersionStore>,
    generation: String,
}

impl StoreHandle {
    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub async fn get(&self, key: &str) -> StoreLookupResult {
        self.store
            .get(&EntryKey::new(self.generation.as_str(), key))
            .await
    }

    pub async fn put(&self, key: &str, entry: StoredResponse) -> StoreResult<()> {
        self.store
            .put(EntryKey::new(self.generation.as_str(), key), entry)
            .await
    }

    /// Fetch every URL and store the successful responses.
    ///
    /// Best effort: a URL that fails, times out or answers non-2xx is
    /// recorded in the report and skipped.
    pub async fn put_all<I>(&self, network: &dyn Network, urls: I) -> PopulateReport
    where
        I: IntoIterator<Item = Url>,
    {
        let outcomes: Vec<(String, bool)> = stream::iter(urls)
            .map(|url| async move {
                let key = normalize_key(&url);
                let stored = self.fetch_and_store(network, &url, &key).await;
                (key, stored)
            })
            .buffer_unordered(self.store.concurrency)
            .collect()
            .await;

        let mut report = PopulateReport::default();
        for (key, stored) in outcomes {
            if stored {
                report.stored += 1;
            } else {
                report.failed.push(key);
            }
        }

        info!(
            generation = %self.generation,
            stored = report.stored,
            failed = report.failed.len(),
            "Bulk population finished"
        );
        report
    }

    async fn fetch_and_store(&self, network: &dyn Network, url: &Url, key: &str) -> bool {
        let response = match fetch_with_timeout(network, url, self.store.request_timeout).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                debug!(url = %url, status = %response.status, "Skipping asset with non-success status");
                return false;
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Skipping asset that failed to fetch");
                return false;
            }
        };

        match self
            .put(key, StoredResponse::from_network(key, &response))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to store asset");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeNetwork;

    fn url(path: &str) -> Url {
        Url::parse("https://app.example.com").unwrap().join(path).unwrap()
    }

    #[tokio::test]
    async fn test_put_all_is_best_effort() {
        let config = GatewayConfig::default();
        let store = Arc::new(VersionStore::new(&config));
        let handle = store.open("v1").await.unwrap();

        let network = FakeNetwork::new();
        network.respond(&url("/app.js"), 200, "app");
        network.respond(&url("/gone.js"), 404, "not found");
        network.respond(&url("/style.css"), 200, "body{}");
        network.fail(&url("/broken.css"));

        let report = handle
            .put_all(
                &network,
                ["/app.js", "/gone.js", "/style.css", "/broken.css"].map(url),
            )
            .await;

        assert_eq!(report.stored, 2);
        assert_eq!(report.attempted(), 4);
        assert!(report.failed.contains(&url("/gone.js").to_string()));
        assert!(report.failed.contains(&url("/broken.css").to_string()));

        let app = handle.get(url("/app.js").as_str()).await.unwrap().unwrap();
        assert_eq!(app.body.as_ref(), b"app");
        assert!(handle.get(url("/gone.js").as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_tier_backs_memory_tier() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::builder().with_store_dir(dir.path()).build();
        let key = url("/app.js").to_string();

        let first = Arc::new(VersionStore::new(&config));
        let network = FakeNetwork::new();
        network.respond(&url("/app.js"), 200, "persisted");
        first
            .open("v1")
            .await
            .unwrap()
            .put_all(&network, [url("/app.js")])
            .await;

        // A second store over the same directory starts with a cold memory tier
        let second = Arc::new(VersionStore::new(&config));
        let handle = second.open("v1").await.unwrap();
        let found = handle.get(&key).await.unwrap().unwrap();
        assert_eq!(found.body.as_ref(), b"persisted");
    }

    #[tokio::test]
    async fn test_delete_generation_across_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::builder().with_store_dir(dir.path()).build();
        let store = Arc::new(VersionStore::new(&config));
        store.open("v1").await.unwrap();
        store.open("v2").await.unwrap();

        store.delete_generation("v1").await.unwrap();

        let generations = store.list_generations().await.unwrap();
        assert_eq!(generations.into_iter().collect::<Vec<_>>(), vec!["v2".to_owned()]);
    }
}
