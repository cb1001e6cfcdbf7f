//! # Generation Collector
//!
//! Removes every store generation except the current one.

use tracing::{info, warn};

use crate::store::{StoreResult, VersionStore};

pub struct GenerationCollector;

impl GenerationCollector {
    /// Delete all generations other than `current`, returning the removed ids.
    ///
    /// A generation that fails to delete is logged and left for the next run.
    pub async fn collect(store: &VersionStore, current: &str) -> StoreResult<Vec<String>> {
        let mut removed = Vec::new();

        for generation in store.list_generations().await? {
            if generation == current {
                continue;
            }

            match store.delete_generation(&generation).await {
                Ok(()) => removed.push(generation),
                Err(e) => {
                    warn!(generation = %generation, error = %e, "Failed to delete stale generation")
                }
            }
        }

        if !removed.is_empty() {
            info!(current = %current, removed = ?removed, "Collected stale generations");
        }
        Ok(removed)
    }
}
