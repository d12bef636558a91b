//! Generational Cache Manager
//!
//! Owns the version-tagged response store. Writes always land in the
//! current generation; lookups fall through to surviving older generations
//! so the previous build keeps serving until activation sweeps it.

use crate::cache::entry::{CacheKey, CachedEntry};
use crate::cache::storage::GenerationStorageRef;
use crate::cache::CacheLookupResult;
use crate::domain::ports::{AgentRequest, AgentResponse, Fetcher};
use crate::error::{Error, Result};
use futures::future::try_join_all;
use reqwest::Url;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

// =============================================================================
// Stats
// =============================================================================

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    generations_evicted: AtomicU64,
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
    pub generations_evicted: u64,
}

impl CacheStatsSnapshot {
    /// Hit ratio over all lookups
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// =============================================================================
// Cache Manager
// =============================================================================

/// Version-tagged response cache
pub struct CacheManager {
    /// Name of the current generation
    current: String,
    storage: GenerationStorageRef,
    stats: CacheStats,
}

impl CacheManager {
    /// Create a manager whose current generation is `version`
    pub fn new(version: impl Into<String>, storage: GenerationStorageRef) -> Self {
        Self {
            current: version.into(),
            storage,
            stats: CacheStats::default(),
        }
    }

    /// Name of the current generation
    pub fn current_generation(&self) -> &str {
        &self.current
    }

    /// Create the current generation if needed
    pub async fn open(&self) -> Result<()> {
        self.storage.open(&self.current).await?;
        debug!(generation = %self.current, backend = self.storage.backend_name(), "Opened cache generation");
        Ok(())
    }

    /// Look up a key: current generation first, then any survivors
    pub async fn get(&self, key: &CacheKey) -> Result<CacheLookupResult> {
        let mut order = vec![self.current.clone()];
        match self.storage.generations().await {
            Ok(names) => order.extend(names.into_iter().filter(|g| *g != self.current)),
            Err(e) => warn!(error = %e, "Listing cache generations failed"),
        }

        for generation in order {
            match self.storage.get(&generation, key).await {
                Ok(Some(entry)) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(CacheLookupResult::Hit { entry, generation });
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(generation = %generation, key = %key, error = %e, "Cache lookup failed");
                    continue;
                }
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        Ok(CacheLookupResult::Miss)
    }

    /// Look up the entry a request would be stored under
    pub async fn match_request(&self, request: &AgentRequest) -> Result<CacheLookupResult> {
        self.get(&CacheKey::for_request(request)).await
    }

    /// Store a response in the current generation, replacing any previous one
    pub async fn put(&self, key: CacheKey, response: AgentResponse) -> Result<()> {
        if !key.is_cacheable_method() {
            self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
            return Err(Error::CacheWrite {
                key: key.to_storage_key(),
                reason: format!("method {} is not cacheable", key.method),
            });
        }

        let entry = CachedEntry::new(key, response);
        let size = entry.size_bytes();
        let key_text = entry.key.to_storage_key();

        match self.storage.put(&self.current, entry).await {
            Ok(()) => {
                self.stats.writes.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key_text, generation = %self.current, size = size, "Stored cache entry");
                Ok(())
            }
            Err(e) => {
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Remove a key from the current generation
    pub async fn delete(&self, key: &CacheKey) -> Result<bool> {
        self.storage.delete(&self.current, key).await
    }

    /// Fetch every manifest URL and store the results.
    ///
    /// All-or-nothing: a transport error or a non-200 response for any URL
    /// aborts before anything is written.
    pub async fn prepopulate(&self, fetcher: &dyn Fetcher, urls: &[Url]) -> Result<usize> {
        let requests: Vec<AgentRequest> = urls
            .iter()
            .map(|url| AgentRequest::new("GET", url.clone()))
            .collect();

        let responses = try_join_all(requests.iter().map(|request| async move {
            let response = fetcher.fetch(request).await.map_err(|e| Error::PrepopulateFailed {
                url: request.url.to_string(),
                reason: e.to_string(),
            })?;
            if !response.is_ok() {
                return Err(Error::PrepopulateFailed {
                    url: request.url.to_string(),
                    reason: format!("HTTP {}", response.status),
                });
            }
            Ok(response)
        }))
        .await?;

        for (request, response) in requests.iter().zip(responses) {
            self.put(CacheKey::for_request(request), response)
                .await
                .map_err(|e| Error::PrepopulateFailed {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                })?;
        }

        info!(generation = %self.current, entries = requests.len(), "Pre-populated cache");
        Ok(requests.len())
    }

    /// Delete every generation except `keep`; returns the evicted names
    pub async fn evict_generations_except(&self, keep: &str) -> Result<Vec<String>> {
        let mut evicted = Vec::new();
        for generation in self.storage.generations().await? {
            if generation == keep {
                continue;
            }
            if self.storage.delete_generation(&generation).await? {
                info!(generation = %generation, "Evicted stale cache generation");
                evicted.push(generation);
            }
        }
        self.stats
            .generations_evicted
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        Ok(evicted)
    }

    /// Names of all stored generations
    pub async fn generations(&self) -> Result<Vec<String>> {
        self.storage.generations().await
    }

    /// Keys of the current generation
    pub async fn keys(&self) -> Result<Vec<CacheKey>> {
        self.storage.keys(&self.current).await
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.storage.health_check().await
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            writes: self.stats.writes.load(Ordering::Relaxed),
            write_failures: self.stats.write_failures.load(Ordering::Relaxed),
            generations_evicted: self.stats.generations_evicted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::MemoryStorage;
    use crate::testing::ScriptedFetcher;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn manager(version: &str, storage: Arc<MemoryStorage>) -> CacheManager {
        CacheManager::new(version, storage)
    }

    fn urls(list: &[&str]) -> Vec<Url> {
        list.iter().map(|u| Url::parse(u).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = manager("v1", Arc::new(MemoryStorage::new()));
        let key = CacheKey::get("https://vocab.test/index.html");

        assert!(cache.get(&key).await.unwrap().is_miss());

        cache.put(key.clone(), AgentResponse::new(200, "<html>")).await.unwrap();
        let result = cache.get(&key).await.unwrap();
        assert_matches!(result, CacheLookupResult::Hit { ref generation, .. } if generation == "v1");
        assert_eq!(result.response().unwrap().body, "<html>");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = manager("v1", Arc::new(MemoryStorage::new()));
        let key = CacheKey::get("https://vocab.test/app.css");

        cache.put(key.clone(), AgentResponse::new(200, "a")).await.unwrap();
        cache.put(key.clone(), AgentResponse::new(200, "b")).await.unwrap();

        let result = cache.get(&key).await.unwrap();
        assert_eq!(result.response().unwrap().body, "b");
    }

    #[tokio::test]
    async fn test_put_rejects_non_get() {
        let cache = manager("v1", Arc::new(MemoryStorage::new()));
        let err = cache
            .put(CacheKey::new("POST", "https://vocab.test/api/score"), AgentResponse::new(200, ""))
            .await
            .unwrap_err();
        assert_matches!(err, Error::CacheWrite { .. });
        assert_eq!(cache.stats().write_failures, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = manager("v1", Arc::new(MemoryStorage::new()));
        let key = CacheKey::get("https://vocab.test/a");
        cache.put(key.clone(), AgentResponse::new(200, "a")).await.unwrap();

        assert!(cache.delete(&key).await.unwrap());
        assert!(cache.get(&key).await.unwrap().is_miss());
    }

    #[tokio::test]
    async fn test_previous_generation_serves_until_evicted() {
        let storage = Arc::new(MemoryStorage::new());
        let old = manager("v1", storage.clone());
        let key = CacheKey::get("https://vocab.test/");
        old.put(key.clone(), AgentResponse::new(200, "old")).await.unwrap();

        let new = manager("v2", storage.clone());
        new.open().await.unwrap();

        // Before activation the old copy is still reachable
        let result = new.get(&key).await.unwrap();
        assert_matches!(result, CacheLookupResult::Hit { ref generation, .. } if generation == "v1");

        let evicted = new.evict_generations_except("v2").await.unwrap();
        assert_eq!(evicted, vec!["v1"]);
        assert!(new.get(&key).await.unwrap().is_miss());
        assert_eq!(new.generations().await.unwrap(), vec!["v2"]);
    }

    #[tokio::test]
    async fn test_current_generation_wins() {
        let storage = Arc::new(MemoryStorage::new());
        let key = CacheKey::get("https://vocab.test/");
        manager("a-old", storage.clone())
            .put(key.clone(), AgentResponse::new(200, "old"))
            .await
            .unwrap();
        let cache = manager("b-new", storage);
        cache.put(key.clone(), AgentResponse::new(200, "new")).await.unwrap();

        assert_eq!(cache.get(&key).await.unwrap().response().unwrap().body, "new");
    }

    #[tokio::test]
    async fn test_prepopulate_all_or_nothing() {
        let fetcher = ScriptedFetcher::new()
            .respond("https://vocab.test/", AgentResponse::new(200, "home"))
            .fail("https://vocab.test/offline.html");
        let cache = manager("v1", Arc::new(MemoryStorage::new()));

        let err = cache
            .prepopulate(&fetcher, &urls(&["https://vocab.test/", "https://vocab.test/offline.html"]))
            .await
            .unwrap_err();
        assert_matches!(err, Error::PrepopulateFailed { ref url, .. } if url == "https://vocab.test/offline.html");

        // Nothing was written
        assert!(cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prepopulate_rejects_non_200() {
        let fetcher = ScriptedFetcher::new()
            .respond("https://vocab.test/", AgentResponse::new(200, "home"))
            .respond("https://vocab.test/missing.png", AgentResponse::new(404, ""));
        let cache = manager("v1", Arc::new(MemoryStorage::new()));

        let result = cache
            .prepopulate(&fetcher, &urls(&["https://vocab.test/", "https://vocab.test/missing.png"]))
            .await;
        assert!(result.is_err());
        assert!(cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prepopulate_success() {
        let fetcher = ScriptedFetcher::new()
            .respond("https://vocab.test/", AgentResponse::new(200, "home"))
            .respond("https://vocab.test/offline.html", AgentResponse::new(200, "offline"));
        let cache = manager("v1", Arc::new(MemoryStorage::new()));

        let count = cache
            .prepopulate(&fetcher, &urls(&["https://vocab.test/", "https://vocab.test/offline.html"]))
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert!(cache
            .get(&CacheKey::get("https://vocab.test/offline.html"))
            .await
            .unwrap()
            .is_hit());
    }
}
