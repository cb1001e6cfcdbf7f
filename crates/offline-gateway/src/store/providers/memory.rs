//! # Memory Store Provider
//!
//! In-memory tier built on a size-bounded Moka cache.

use std::collections::BTreeSet;

use moka::future::Cache as MokaCache;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::store::providers::StoreProvider;
use crate::store::types::{EntryKey, StoreLookupResult, StoreResult, StoredResponse};

/// Memory store provider implementation using Moka
pub struct MemoryStore {
    /// Entries of every generation, weighted by body size
    cache: MokaCache<EntryKey, StoredResponse>,
    /// Generations known to this tier, including empty ones
    generations: RwLock<BTreeSet<String>>,
    /// Maximum size for this tier in bytes
    max_size: u64,
}

impl MemoryStore {
    /// Create a new memory store with the specified size limit
    pub fn new(max_size_bytes: u64) -> Self {
        let max_size = max_size_bytes.max(1);

        let cache = MokaCache::builder()
            .weigher(|_k, v: &StoredResponse| v.body.len().try_into().unwrap_or(u32::MAX))
            .max_capacity(max_size)
            .build();

        debug!(max_size = max_size, "Memory store created with size limit");

        Self {
            cache,
            generations: RwLock::new(BTreeSet::new()),
            max_size,
        }
    }
}

#[async_trait::async_trait]
impl StoreProvider for MemoryStore {
    async fn open_generation(&self, generation: &str) -> StoreResult<()> {
        self.generations.write().insert(generation.to_owned());
        Ok(())
    }

    async fn get(&self, key: &EntryKey) -> StoreLookupResult {
        Ok(self.cache.get(key).await)
    }

    async fn put(&self, key: EntryKey, entry: StoredResponse) -> StoreResult<()> {
        self.generations.write().insert(key.generation.clone());

        // A single entry shouldn't be larger than the whole tier
        if entry.metadata.size > self.max_size {
            warn!(
                key = ?key,
                size = entry.metadata.size,
                max_size = self.max_size,
                "Entry too large for memory store, skipping"
            );
            return Ok(());
        }

        self.cache.insert(key, entry).await;
        Ok(())
    }

    async fn list_generations(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self.generations.read().clone())
    }

    async fn delete_generation(&self, generation: &str) -> StoreResult<()> {
        let doomed: Vec<_> = self
            .cache
            .iter()
            .filter(|(key, _)| key.generation == generation)
            .map(|(key, _)| key)
            .collect();

        for key in &doomed {
            self.cache.invalidate(key.as_ref()).await;
        }
        self.generations.write().remove(generation);

        debug!(generation = %generation, entries = doomed.len(), "Dropped generation from memory store");
        Ok(())
    }
}
