//! Generational Response Cache
//!
//! A version-tagged store of HTTP responses keyed by method and URL.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Cache Manager                                  │
//! │   put / get / delete / prepopulate / evict_generations_except            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐   ┌──────────────────────┐                    │
//! │  │ generation "v0.2.0"  │   │ generation "v0.3.0"  │  <- current        │
//! │  │ (evicted at activate)│   │                      │                    │
//! │  └──────────────────────┘   └──────────────────────┘                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                     GenerationStorage backends                           │
//! │  ┌──────────────────────┐   ┌──────────────────────────────────────┐    │
//! │  │  MemoryStorage       │   │  LocalStorage (one dir per generation)│    │
//! │  │  (DashMap)           │   │  body file + .meta sidecar            │    │
//! │  └──────────────────────┘   └──────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use vocab_agent::cache::{CacheManager, CacheKey, MemoryStorage};
//! use std::sync::Arc;
//!
//! let cache = CacheManager::new("vocab-v3", Arc::new(MemoryStorage::new()));
//! cache.open().await?;
//! cache.prepopulate(fetcher.as_ref(), &manifest).await?;
//!
//! match cache.get(&CacheKey::get("https://vocab.test/")).await? {
//!     CacheLookupResult::Hit { entry, generation } => { /* serve entry.response */ }
//!     CacheLookupResult::Miss => { /* go to network */ }
//! }
//! ```

pub mod entry;
pub mod manager;
pub mod storage;

pub use entry::{CacheKey, CachedEntry};
pub use manager::{CacheManager, CacheStatsSnapshot};
pub use storage::{
    GenerationStorage, GenerationStorageRef, LocalStorage, LocalStorageConfig, MemoryStorage,
    MemoryStorageConfig,
};

use crate::domain::ports::AgentResponse;

// =============================================================================
// Cache Lookup Result
// =============================================================================

/// Result of a cache lookup operation
#[derive(Debug, Clone)]
pub enum CacheLookupResult {
    /// Cache hit with the stored entry and the generation it came from
    Hit {
        entry: CachedEntry,
        generation: String,
    },
    /// Not found in any generation
    Miss,
}

impl CacheLookupResult {
    /// Check if this is a cache hit
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookupResult::Hit { .. })
    }

    /// Check if this is a cache miss
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheLookupResult::Miss)
    }

    /// Get the stored response if this is a hit
    pub fn response(&self) -> Option<&AgentResponse> {
        match self {
            CacheLookupResult::Hit { entry, .. } => Some(&entry.response),
            CacheLookupResult::Miss => None,
        }
    }

    /// Take the stored response if this is a hit
    pub fn into_response(self) -> Option<AgentResponse> {
        match self {
            CacheLookupResult::Hit { entry, .. } => Some(entry.response),
            CacheLookupResult::Miss => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_result_accessors() {
        let hit = CacheLookupResult::Hit {
            entry: CachedEntry::new(
                CacheKey::get("https://vocab.test/"),
                AgentResponse::new(200, "test"),
            ),
            generation: "v1".into(),
        };
        assert!(hit.is_hit());
        assert!(!hit.is_miss());
        assert_eq!(hit.response().map(|r| r.status), Some(200));
        assert_eq!(hit.into_response().unwrap().body, "test");

        let miss = CacheLookupResult::Miss;
        assert!(!miss.is_hit());
        assert!(miss.is_miss());
        assert!(miss.response().is_none());
        assert!(miss.into_response().is_none());
    }
}
