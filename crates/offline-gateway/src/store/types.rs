//! # Store Types
//!
//! Common types used across the version store.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::network::NetworkResponse;

/// Identifies one entry: a normalized URL within a generation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub generation: String,
    pub url: String,
}

impl EntryKey {
    pub fn new(generation: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            generation: generation.into(),
            url: url.into(),
        }
    }

    /// Filename-safe digest of the URL
    pub fn to_filename(&self) -> String {
        let hash = Sha256::digest(self.url.as_bytes());
        format!("{hash:x}")
    }
}

/// Everything about a stored response except its body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Normalized key the entry is stored under
    pub key: String,
    /// Final URL the response came from
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub captured_at: DateTime<Utc>,
    pub size: u64,
}

/// A response held by the version store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub metadata: EntryMetadata,
    pub body: Bytes,
}

impl StoredResponse {
    /// Capture a network response under `key`
    pub fn from_network(key: impl Into<String>, response: &NetworkResponse) -> Self {
        Self {
            metadata: EntryMetadata {
                key: key.into(),
                url: response.url.to_string(),
                status: response.status.as_u16(),
                headers: response.headers.clone(),
                captured_at: Utc::now(),
                size: response.body.len() as u64,
            },
            body: response.body.clone(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.metadata
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// Outcome of a best-effort bulk population
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub stored: usize,
    pub failed: Vec<String>,
}

impl PopulateReport {
    pub fn attempted(&self) -> usize {
        self.stored + self.failed.len()
    }
}

/// Result of a store operation
pub type StoreResult<T> = std::result::Result<T, std::io::Error>;

/// Result of a store lookup
pub type StoreLookupResult = StoreResult<Option<StoredResponse>>;
