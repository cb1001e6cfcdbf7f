//! # File Store
//!
//! Persistent tier. Each generation is a directory named after the hex
//! encoding of its id; each entry is a `.body` file plus a JSON `.meta` file
//! named after the SHA-256 of its key.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use crate::store::types::{
    EntryKey, EntryMetadata, StoreLookupResult, StoreResult, StoredResponse,
};

use super::StoreProvider;

const BODY_EXTENSION: &str = "body";
const META_EXTENSION: &str = "meta";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a file store rooted at `root`; directories are created lazily
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, generation: &str) -> PathBuf {
        self.root.join(hex::encode(generation.as_bytes()))
    }

    fn entry_path(&self, key: &EntryKey, extension: &str) -> PathBuf {
        let mut path = self.generation_dir(&key.generation).join(key.to_filename());
        path.set_extension(extension);
        path
    }

    /// Uniquely named sibling for an in-progress write
    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.to_path_buf();
        temp.set_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        temp
    }
}

#[async_trait::async_trait]
impl StoreProvider for FileStore {
    async fn open_generation(&self, generation: &str) -> StoreResult<()> {
        fs::create_dir_all(self.generation_dir(generation)).await
    }

    async fn get(&self, key: &EntryKey) -> StoreLookupResult {
        let body_path = self.entry_path(key, BODY_EXTENSION);
        let meta_path = self.entry_path(key, META_EXTENSION);

        let metadata_bytes = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let metadata: EntryMetadata = match serde_json::from_slice(&metadata_bytes) {
            Ok(m) => m,
            Err(e) => {
                // Left in place; the next put for this key replaces it
                warn!(path = ?meta_path, error = %e, "Failed to parse entry metadata, treating as miss");
                return Ok(None);
            }
        };

        let body = match fs::read(&body_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        // Interleaved renames from two writers can pair a body with foreign metadata
        if body.len() as u64 != metadata.size {
            debug!(key = ?key, "Entry body does not match its metadata, treating as miss");
            return Ok(None);
        }

        Ok(Some(StoredResponse {
            metadata,
            body: Bytes::from(body),
        }))
    }

    async fn put(&self, key: EntryKey, entry: StoredResponse) -> StoreResult<()> {
        self.open_generation(&key.generation).await?;

        let body_path = self.entry_path(&key, BODY_EXTENSION);
        let meta_path = self.entry_path(&key, META_EXTENSION);

        let metadata_json = serde_json::to_vec(&entry.metadata).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to serialize metadata: {e}"),
            )
        })?;

        // Write to private temporary files then rename, so concurrent
        // writers never observe a partially written entry
        let temp_body_path = Self::temp_path(&body_path);
        let temp_meta_path = Self::temp_path(&meta_path);

        if let Err(e) = fs::write(&temp_body_path, &entry.body).await {
            warn!(path = ?temp_body_path, error = %e, "Failed to write entry body");
            let _ = fs::remove_file(&temp_body_path).await;
            return Err(e);
        }

        if let Err(e) = fs::write(&temp_meta_path, &metadata_json).await {
            warn!(path = ?temp_meta_path, error = %e, "Failed to write entry metadata");
            let _ = fs::remove_file(&temp_body_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_body_path, &body_path).await {
            warn!(from = ?temp_body_path, to = ?body_path, error = %e, "Failed to rename entry body");
            let _ = fs::remove_file(&temp_body_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_meta_path, &meta_path).await {
            warn!(from = ?temp_meta_path, to = ?meta_path, error = %e, "Failed to rename entry metadata");
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        debug!(key = ?key, "Stored entry to file");
        Ok(())
    }

    async fn list_generations(&self) -> StoreResult<BTreeSet<String>> {
        let mut generations = BTreeSet::new();

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(generations),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let name = entry.file_name();
            let decoded = name
                .to_str()
                .and_then(|n| hex::decode(n).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());

            match decoded {
                Some(generation) => {
                    generations.insert(generation);
                }
                None => warn!(path = ?entry.path(), "Ignoring unrecognized directory in store"),
            }
        }

        Ok(generations)
    }

    async fn delete_generation(&self, generation: &str) -> StoreResult<()> {
        let dir = self.generation_dir(generation);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(generation = %generation, "Deleted generation directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(dir = ?dir, error = %e, "Failed to delete generation directory");
                Err(e)
            }
        }
    }
}
