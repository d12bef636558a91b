//! Cache Entry Types
//!
//! Defines cache keys and stored responses.

use crate::domain::ports::{AgentRequest, AgentResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest stem written verbatim; leaves room for the `.meta` suffix
const MAX_STEM_LEN: usize = 200;
const STEM_PREFIX_LEN: usize = 160;

// =============================================================================
// Cache Key
// =============================================================================

/// Identifies a cached response: method plus absolute URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Upper-case HTTP method
    pub method: String,
    /// Absolute URL, fragment stripped
    pub url: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url: url.into(),
        }
    }

    /// Key for a GET of `url`
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Key a request is stored under
    pub fn for_request(request: &AgentRequest) -> Self {
        let mut url = request.url.clone();
        url.set_fragment(None);
        Self::new(request.method.as_str(), url.to_string())
    }

    /// Get a string representation for storage
    pub fn to_storage_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    /// Parse from storage key string
    pub fn from_storage_key(key: &str) -> Option<Self> {
        let (method, url) = key.split_once(' ')?;
        if method.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self::new(method, url))
    }

    /// Only GET responses are ever cached
    pub fn is_cacheable_method(&self) -> bool {
        self.method == "GET"
    }

    /// File-name stem for disk storage, identical across builds.
    ///
    /// The percent-encoded storage key with `.` escaped too, so the body
    /// file never carries an extension of its own. Keys that would exceed
    /// the file-name limit keep a prefix plus an FNV-1a digest of the key.
    pub fn file_stem(&self) -> String {
        let key = self.to_storage_key();
        let encoded = urlencoding::encode(&key).replace('.', "%2E");
        if encoded.len() <= MAX_STEM_LEN {
            return encoded;
        }
        // Percent-encoding output is ASCII, so any byte index is a boundary
        format!("{}~{:016x}", &encoded[..STEM_PREFIX_LEN], fnv1a64(key.as_bytes()))
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_storage_key())
    }
}

// =============================================================================
// Cached Entry
// =============================================================================

/// A stored response with its key and storage time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub key: CacheKey,
    pub response: AgentResponse,
    pub stored_at: DateTime<Utc>,
}

impl CachedEntry {
    /// Create an entry stamped with the current time
    pub fn new(key: CacheKey, response: AgentResponse) -> Self {
        Self {
            key,
            response,
            stored_at: Utc::now(),
        }
    }

    /// Body size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.response.body.len() as u64
    }

    /// Seconds since the entry was stored
    pub fn age_seconds(&self) -> u64 {
        let age = Utc::now().signed_duration_since(self.stored_at);
        age.num_seconds().max(0) as u64
    }
}
