//! In-Memory Generation Storage
//!
//! Generation store backed by nested DashMaps for concurrent access.

use crate::cache::entry::{CacheKey, CachedEntry};
use crate::cache::storage::GenerationStorage;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Memory Storage Configuration
// =============================================================================

/// Configuration for memory storage
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageConfig {
    /// Maximum entries per generation (None = unbounded)
    pub max_entries_per_generation: Option<usize>,
}

// =============================================================================
// Memory Storage
// =============================================================================

/// In-memory generation storage
pub struct MemoryStorage {
    /// generation -> storage key -> entry
    generations: DashMap<String, DashMap<String, CachedEntry>>,
    /// Total entries across generations
    entry_count: AtomicU64,
    max_entries_per_generation: Option<usize>,
}

impl MemoryStorage {
    /// Create new memory storage with default config
    pub fn new() -> Self {
        Self::with_config(MemoryStorageConfig::default())
    }

    /// Create new memory storage with full config
    pub fn with_config(config: MemoryStorageConfig) -> Self {
        Self {
            generations: DashMap::new(),
            entry_count: AtomicU64::new(0),
            max_entries_per_generation: config.max_entries_per_generation,
        }
    }

    /// Total entries across all generations
    pub fn entry_count(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationStorage for MemoryStorage {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn open(&self, generation: &str) -> Result<()> {
        self.generations.entry(generation.to_string()).or_default();
        Ok(())
    }

    async fn generations(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.generations.iter().map(|r| r.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<CachedEntry>> {
        let entries = match self.generations.get(generation) {
            Some(entries) => entries,
            None => return Ok(None),
        };
        let entry = entries.get(&key.to_storage_key()).map(|e| e.value().clone());
        Ok(entry)
    }

    async fn put(&self, generation: &str, entry: CachedEntry) -> Result<()> {
        let storage_key = entry.key.to_storage_key();
        let entries = self.generations.entry(generation.to_string()).or_default();

        let replacing = entries.contains_key(&storage_key);
        if !replacing {
            if let Some(max) = self.max_entries_per_generation {
                if entries.len() >= max {
                    return Err(Error::CacheWrite {
                        key: storage_key,
                        reason: format!("quota of {} entries exceeded", max),
                    });
                }
            }
            self.entry_count.fetch_add(1, Ordering::Relaxed);
        }

        entries.insert(storage_key, entry);
        Ok(())
    }

    async fn delete(&self, generation: &str, key: &CacheKey) -> Result<bool> {
        let removed = match self.generations.get(generation) {
            Some(entries) => entries.remove(&key.to_storage_key()).is_some(),
            None => false,
        };
        if removed {
            self.entry_count.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool> {
        match self.generations.remove(generation) {
            Some((_, entries)) => {
                self.entry_count
                    .fetch_sub(entries.len() as u64, Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self, generation: &str) -> Result<Vec<CacheKey>> {
        let keys = match self.generations.get(generation) {
            Some(entries) => entries
                .iter()
                .filter_map(|r| CacheKey::from_storage_key(r.key()))
                .collect(),
            None => Vec::new(),
        };
        Ok(keys)
    }

    async fn health_check(&self) -> Result<bool> {
        // Memory storage is always healthy if we got here
        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::tests::test_entry;

    #[tokio::test]
    async fn test_basic_operations() {
        let storage = MemoryStorage::new();

        let entry = test_entry("https://vocab.test/", "home");
        storage.put("v1", entry.clone()).await.unwrap();
        assert_eq!(storage.entry_count(), 1);

        let retrieved = storage.get("v1", &entry.key).await.unwrap().unwrap();
        assert_eq!(retrieved.response.body, entry.response.body);

        // Other generations do not see it
        assert!(storage.get("v2", &entry.key).await.unwrap().is_none());

        assert!(storage.delete("v1", &entry.key).await.unwrap());
        assert!(!storage.delete("v1", &entry.key).await.unwrap());
        assert_eq!(storage.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let storage = MemoryStorage::new();

        storage.put("v1", test_entry("https://vocab.test/a.js", "old")).await.unwrap();
        storage.put("v1", test_entry("https://vocab.test/a.js", "new")).await.unwrap();

        assert_eq!(storage.entry_count(), 1);
        let entry = storage
            .get("v1", &CacheKey::get("https://vocab.test/a.js"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&entry.response.body[..], b"new");
    }

    #[tokio::test]
    async fn test_generations_and_delete_generation() {
        let storage = MemoryStorage::new();

        storage.open("v2").await.unwrap();
        storage.put("v1", test_entry("https://vocab.test/a", "a")).await.unwrap();
        storage.put("v1", test_entry("https://vocab.test/b", "b")).await.unwrap();

        assert_eq!(storage.generations().await.unwrap(), vec!["v1", "v2"]);
        assert_eq!(storage.keys("v1").await.unwrap().len(), 2);

        assert!(storage.delete_generation("v1").await.unwrap());
        assert!(!storage.delete_generation("v1").await.unwrap());
        assert_eq!(storage.generations().await.unwrap(), vec!["v2"]);
        assert_eq!(storage.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_quota() {
        let storage = MemoryStorage::with_config(MemoryStorageConfig {
            max_entries_per_generation: Some(1),
        });

        storage.put("v1", test_entry("https://vocab.test/a", "a")).await.unwrap();
        let err = storage
            .put("v1", test_entry("https://vocab.test/b", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CacheWrite { .. }));

        // Replacement within quota is fine
        storage.put("v1", test_entry("https://vocab.test/a", "a2")).await.unwrap();
    }
}
