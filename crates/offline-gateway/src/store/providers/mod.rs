//! # Store Providers
//!
//! Storage tiers behind the version store.

pub use self::file::FileStore;
pub use self::memory::MemoryStore;
pub use self::provider::StoreProvider;

pub mod provider;

pub mod file;
pub mod memory;
