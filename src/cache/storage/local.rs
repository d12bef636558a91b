//! Local Disk Generation Storage
//!
//! File-based generation store. Each generation is a directory under the
//! root; each entry is a body file plus a `.meta` JSON sidecar. The sidecar
//! is written last, so an entry without one is ignored on rebuild.

use crate::cache::entry::{CacheKey, CachedEntry};
use crate::cache::storage::GenerationStorage;
use crate::domain::ports::{AgentResponse, ResponseKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

// =============================================================================
// Local Storage Configuration
// =============================================================================

/// Configuration for local storage
#[derive(Debug, Clone)]
pub struct LocalStorageConfig {
    /// Root directory for generation directories
    pub root_path: PathBuf,
    /// Whether to fsync entry files after writing
    pub sync_writes: bool,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("/var/cache/vocab-agent"),
            sync_writes: false,
        }
    }
}

// =============================================================================
// Entry Metadata (stored alongside data)
// =============================================================================

/// Metadata stored with each body file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMetadata {
    key: String,
    status: u16,
    headers: Vec<(String, String)>,
    kind: ResponseKind,
    stored_at: DateTime<Utc>,
}

type GenerationIndex = HashMap<String, PathBuf>;

// =============================================================================
// Local Storage
// =============================================================================

/// Disk-backed generation storage
pub struct LocalStorage {
    root_path: PathBuf,
    /// generation -> storage key -> body file path
    index: RwLock<HashMap<String, GenerationIndex>>,
    sync_writes: bool,
}

impl LocalStorage {
    /// Create new local storage with specified root path
    pub async fn with_path(root_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(LocalStorageConfig {
            root_path: root_path.into(),
            ..Default::default()
        })
        .await
    }

    /// Create new local storage with full config
    pub async fn with_config(config: LocalStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.root_path).await?;

        let storage = Self {
            root_path: config.root_path,
            index: RwLock::new(HashMap::new()),
            sync_writes: config.sync_writes,
        };

        storage.rebuild_index().await?;
        Ok(storage)
    }

    /// Rebuild index from disk
    async fn rebuild_index(&self) -> Result<()> {
        let mut rebuilt: HashMap<String, GenerationIndex> = HashMap::new();

        let mut root_entries = fs::read_dir(&self.root_path).await?;
        while let Some(root_entry) = root_entries.next_entry().await? {
            let generation_path = root_entry.path();
            if !generation_path.is_dir() {
                continue;
            }

            let dir_name = root_entry.file_name().to_string_lossy().to_string();
            let generation = match urlencoding::decode(&dir_name) {
                Ok(name) => name.into_owned(),
                Err(_) => {
                    warn!(dir = %dir_name, "Skipping undecodable generation directory");
                    continue;
                }
            };

            let mut generation_index = GenerationIndex::new();
            let mut files = match fs::read_dir(&generation_path).await {
                Ok(files) => files,
                Err(_) => continue,
            };

            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().map(|e| e == "meta").unwrap_or(false) {
                    if let Some(metadata) = read_metadata(&path).await {
                        let data_path = path.with_extension("");
                        if data_path.exists() {
                            generation_index.insert(metadata.key, data_path);
                        }
                    }
                }
            }

            rebuilt.insert(generation, generation_index);
        }

        let total: usize = rebuilt.values().map(|g| g.len()).sum();
        debug!(
            generations = rebuilt.len(),
            entries = total,
            "Rebuilt local cache index"
        );

        *self.index.write() = rebuilt;
        Ok(())
    }

    /// Directory holding a generation
    fn generation_dir(&self, generation: &str) -> PathBuf {
        self.root_path.join(urlencoding::encode(generation).as_ref())
    }

    /// Body file path for a key
    fn file_path(&self, generation: &str, key: &CacheKey) -> PathBuf {
        self.generation_dir(generation).join(key.file_stem())
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut file = fs::File::create(path).await?;
        file.write_all(contents).await?;
        if self.sync_writes {
            file.sync_all().await?;
        }
        Ok(())
    }
}

async fn read_metadata(meta_path: &Path) -> Option<StoredMetadata> {
    let json = fs::read_to_string(meta_path).await.ok()?;
    serde_json::from_str(&json).ok()
}

#[async_trait]
impl GenerationStorage for LocalStorage {
    fn backend_name(&self) -> &str {
        "local"
    }

    async fn open(&self, generation: &str) -> Result<()> {
        fs::create_dir_all(self.generation_dir(generation)).await?;
        self.index
            .write()
            .entry(generation.to_string())
            .or_default();
        Ok(())
    }

    async fn generations(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.index.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<CachedEntry>> {
        let data_path = {
            let index = self.index.read();
            match index
                .get(generation)
                .and_then(|g| g.get(&key.to_storage_key()))
            {
                Some(path) => path.clone(),
                None => return Ok(None),
            }
        };

        let metadata = match read_metadata(&data_path.with_extension("meta")).await {
            Some(m) => m,
            None => return Ok(None),
        };

        let body = match fs::read(&data_path).await {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        };

        let response = AgentResponse {
            status: metadata.status,
            headers: metadata.headers,
            body: Bytes::from(body),
            kind: metadata.kind,
        };

        Ok(Some(CachedEntry {
            key: key.clone(),
            response,
            stored_at: metadata.stored_at,
        }))
    }

    async fn put(&self, generation: &str, entry: CachedEntry) -> Result<()> {
        let storage_key = entry.key.to_storage_key();
        let data_path = self.file_path(generation, &entry.key);
        let meta_path = data_path.with_extension("meta");

        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let metadata = StoredMetadata {
            key: storage_key.clone(),
            status: entry.response.status,
            headers: entry.response.headers.clone(),
            kind: entry.response.kind,
            stored_at: entry.stored_at,
        };

        self.write_file(&data_path, &entry.response.body)
            .await
            .map_err(|e| Error::CacheWrite {
                key: storage_key.clone(),
                reason: e.to_string(),
            })?;
        self.write_file(&meta_path, serde_json::to_string(&metadata)?.as_bytes())
            .await
            .map_err(|e| Error::CacheWrite {
                key: storage_key.clone(),
                reason: e.to_string(),
            })?;

        self.index
            .write()
            .entry(generation.to_string())
            .or_default()
            .insert(storage_key, data_path);

        Ok(())
    }

    async fn delete(&self, generation: &str, key: &CacheKey) -> Result<bool> {
        let removed = self
            .index
            .write()
            .get_mut(generation)
            .and_then(|g| g.remove(&key.to_storage_key()));

        match removed {
            Some(data_path) => {
                let _ = fs::remove_file(data_path.with_extension("meta")).await;
                let _ = fs::remove_file(&data_path).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool> {
        let existed = self.index.write().remove(generation).is_some();
        let dir = self.generation_dir(generation);
        if dir.exists() {
            fs::remove_dir_all(&dir).await?;
            return Ok(true);
        }
        Ok(existed)
    }

    async fn keys(&self, generation: &str) -> Result<Vec<CacheKey>> {
        let index = self.index.read();
        let keys = match index.get(generation) {
            Some(g) => g.keys().filter_map(|k| CacheKey::from_storage_key(k)).collect(),
            None => Vec::new(),
        };
        Ok(keys)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(fs::metadata(&self.root_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::tests::test_entry;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::with_path(tmp.path()).await.unwrap();

        let entry = test_entry("https://vocab.test/app.js", "console.log(1)");
        storage.put("v1", entry.clone()).await.unwrap();

        let retrieved = storage.get("v1", &entry.key).await.unwrap().unwrap();
        assert_eq!(retrieved.response, entry.response);
        assert_eq!(retrieved.stored_at, entry.stored_at);

        assert!(storage.delete("v1", &entry.key).await.unwrap());
        assert!(storage.get("v1", &entry.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_survives_restart() {
        let tmp = TempDir::new().unwrap();

        {
            let storage = LocalStorage::with_path(tmp.path()).await.unwrap();
            storage
                .put("vocab-v1", test_entry("https://vocab.test/", "home"))
                .await
                .unwrap();
            storage.open("vocab/v2").await.unwrap();
        }

        let reopened = LocalStorage::with_path(tmp.path()).await.unwrap();
        assert_eq!(
            reopened.generations().await.unwrap(),
            vec!["vocab-v1", "vocab/v2"]
        );
        let entry = reopened
            .get("vocab-v1", &CacheKey::get("https://vocab.test/"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&entry.response.body[..], b"home");
    }

    #[tokio::test]
    async fn test_delete_generation_removes_files() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::with_path(tmp.path()).await.unwrap();

        storage.put("old", test_entry("https://vocab.test/a", "a")).await.unwrap();
        storage.put("new", test_entry("https://vocab.test/a", "b")).await.unwrap();

        assert!(storage.delete_generation("old").await.unwrap());
        assert_eq!(storage.generations().await.unwrap(), vec!["new"]);
        assert!(!tmp.path().join("old").exists());
        assert!(storage.health_check().await.unwrap());
    }
}
