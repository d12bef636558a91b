//! Agent configuration
//!
//! Loaded from an optional YAML file; every section has defaults so an empty
//! file (or none at all) yields a working standalone agent. Command-line
//! flags override individual fields after loading.
//!
//! ```yaml
//! cache:
//!   version: vocab-v4
//!   backend: local
//!   path: /var/cache/vocab-agent
//! dispatch:
//!   origin: https://vocab.example.com
//! monitor:
//!   interval_secs: 30
//!   anomaly_threshold: 100
//! ledger:
//!   kind: rest
//!   rest:
//!     base_url: https://db.example.com/rest/v1
//! ```

use crate::dispatch::DispatcherConfig;
use crate::error::{Error, Result};
use crate::messaging::NotificationDefaults;
use crate::monitor::MonitorConfig;
use crate::network::HttpFetcherConfig;
use crate::ledger::RestLedgerConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Resources cached at install time, relative to the origin
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/offline.html",
    "/manifest.json",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
];

// =============================================================================
// Sections
// =============================================================================

/// Cache storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Memory,
    Local,
}

impl std::str::FromStr for StorageBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackendKind::Memory),
            "local" | "disk" => Ok(StorageBackendKind::Local),
            other => Err(Error::Configuration(format!("unknown storage backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Generation name; bumping it evicts every other generation
    pub version: String,
    pub backend: StorageBackendKind,
    /// Root directory for the local backend
    pub path: PathBuf,
    /// Quota for the memory backend
    pub max_entries_per_generation: Option<usize>,
    /// Paths pre-populated at install
    pub manifest: Vec<String>,
    /// Longest wait between install attempts after a failed install
    pub install_retry_max_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: format!("vocab-v{}", env!("CARGO_PKG_VERSION")),
            backend: StorageBackendKind::Memory,
            path: PathBuf::from("/var/cache/vocab-agent"),
            max_entries_per_generation: None,
            manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
            install_retry_max_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Application origin
    pub origin: String,
    pub api_prefix: String,
    /// Path of the offline fallback document
    pub offline_document: String,
    pub fetch: HttpFetcherConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            api_prefix: "/api/".to_string(),
            offline_document: "/offline.html".to_string(),
            fetch: HttpFetcherConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Start monitoring as part of the lifecycle
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: MonitorConfig,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: MonitorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Memory,
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub kind: LedgerKind,
    pub rest: RestLedgerConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            kind: LedgerKind::Memory,
            rest: RestLedgerConfig::default(),
        }
    }
}

// =============================================================================
// Agent Config
// =============================================================================

/// Complete agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub cache: CacheConfig,
    pub dispatch: DispatchConfig,
    pub monitor: MonitorSection,
    pub ledger: LedgerConfig,
    pub notifications: NotificationDefaults,
}

impl AgentConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.version.trim().is_empty() {
            return Err(Error::Configuration("cache version must not be empty".into()));
        }
        if self.cache.install_retry_max_secs == 0 {
            return Err(Error::Configuration("install retry interval must be positive".into()));
        }
        if self.monitor.settings.interval_secs == 0 {
            return Err(Error::Configuration("monitor interval must be positive".into()));
        }
        if self.monitor.settings.window_size == 0 {
            return Err(Error::Configuration("history window must hold at least one sample".into()));
        }
        if self.monitor.settings.anomaly_threshold < 0 {
            return Err(Error::Configuration("anomaly threshold must not be negative".into()));
        }
        self.origin()?;
        self.offline_document_url()?;
        self.manifest_urls()?;
        if self.ledger.kind == LedgerKind::Rest {
            Url::parse(&self.ledger.rest.base_url).map_err(|e| {
                Error::Configuration(format!("invalid ledger url {}: {}", self.ledger.rest.base_url, e))
            })?;
        }
        Ok(())
    }

    /// Absolute application origin
    pub fn origin(&self) -> Result<Url> {
        let origin = Url::parse(&self.dispatch.origin).map_err(|e| {
            Error::Configuration(format!("origin {} is not an absolute URL: {}", self.dispatch.origin, e))
        })?;
        if !matches!(origin.scheme(), "http" | "https") || origin.host_str().is_none() {
            return Err(Error::Configuration(format!(
                "origin {} must be an http(s) URL with a host",
                self.dispatch.origin
            )));
        }
        Ok(origin)
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.origin()?
            .join(path)
            .map_err(|e| Error::Configuration(format!("cannot resolve {}: {}", path, e)))
    }

    pub fn manifest_urls(&self) -> Result<Vec<Url>> {
        self.cache.manifest.iter().map(|p| self.resolve(p)).collect()
    }

    pub fn offline_document_url(&self) -> Result<Url> {
        self.resolve(&self.dispatch.offline_document)
    }

    pub fn dispatcher_config(&self) -> Result<DispatcherConfig> {
        Ok(DispatcherConfig {
            origin: self.origin()?,
            api_prefix: self.dispatch.api_prefix.clone(),
            offline_document: self.offline_document_url()?,
        })
    }
}
