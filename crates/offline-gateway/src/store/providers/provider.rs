//! # Store Provider
//!
//! The trait every storage tier implements.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::store::types::{EntryKey, StoreLookupResult, StoreResult, StoredResponse};

/// A generation-namespaced response store
///
/// Implementations must tolerate concurrent readers and writers; the last
/// write to a key wins.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Make sure the generation exists, even while empty
    async fn open_generation(&self, generation: &str) -> StoreResult<()>;

    /// Get an entry from the store
    async fn get(&self, key: &EntryKey) -> StoreLookupResult;

    /// Put an entry into the store, replacing any previous one
    async fn put(&self, key: EntryKey, entry: StoredResponse) -> StoreResult<()>;

    /// Every generation currently held
    async fn list_generations(&self) -> StoreResult<BTreeSet<String>>;

    /// Drop a generation and all of its entries
    async fn delete_generation(&self, generation: &str) -> StoreResult<()>;
}
