//! Cache Storage Backends
//!
//! A generation store maps generation names to independent key spaces.
//! The in-memory backend is used for tests and ephemeral runs; the local
//! backend survives restarts, which is what makes a version bump evict the
//! previous run's entries.

mod local;
mod memory;

pub use local::{LocalStorage, LocalStorageConfig};
pub use memory::{MemoryStorage, MemoryStorageConfig};

use crate::cache::entry::{CacheKey, CachedEntry};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// GenerationStorage Trait
// =============================================================================

/// Storage operations over named cache generations
#[async_trait]
pub trait GenerationStorage: Send + Sync {
    /// Backend name used in logs
    fn backend_name(&self) -> &str;

    /// Create the generation if it does not exist yet
    async fn open(&self, generation: &str) -> Result<()>;

    /// Names of all existing generations
    async fn generations(&self) -> Result<Vec<String>>;

    /// Get an entry from a generation
    async fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<CachedEntry>>;

    /// Store an entry, replacing any previous one for the same key.
    /// The generation is created on demand.
    async fn put(&self, generation: &str, entry: CachedEntry) -> Result<()>;

    /// Delete an entry; returns whether it existed
    async fn delete(&self, generation: &str, key: &CacheKey) -> Result<bool>;

    /// Delete a whole generation; returns whether it existed
    async fn delete_generation(&self, generation: &str) -> Result<bool>;

    /// All keys of a generation
    async fn keys(&self, generation: &str) -> Result<Vec<CacheKey>>;

    /// Check if storage is available
    async fn health_check(&self) -> Result<bool>;
}

/// Type alias for shared generation storage
pub type GenerationStorageRef = Arc<dyn GenerationStorage>;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::ports::AgentResponse;

    /// Helper to create a test entry
    pub fn test_entry(url: &str, body: &str) -> CachedEntry {
        CachedEntry::new(CacheKey::get(url), AgentResponse::new(200, body.to_string()))
    }
}
