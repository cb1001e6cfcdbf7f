//! # Version Store
//!
//! A keyed byte store namespaced by cache generation. Entries survive process
//! restarts when a store directory is configured.

mod manager;
pub mod providers;
mod types;
mod utils;

pub use manager::{StoreHandle, VersionStore};
pub use types::{
    EntryKey, EntryMetadata, PopulateReport, StoreLookupResult, StoreResult, StoredResponse,
};
pub use utils::{normalize_key, strip_query};

pub use providers::{FileStore, MemoryStore, StoreProvider};
