//! Vocab Agent - Offline Cache and Score Monitor
//!
//! A background agent for the vocabulary learning app. It sits between the
//! app and its origin, answers requests from a versioned cache according to
//! per-resource strategies, and watches the leaderboard for sudden score
//! drops.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                               Agent API                                      │
//! │        /__agent/{control,push,online,status,notifications} + proxy          │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │   Lifecycle     │  │    Strategy     │  │      Messaging              │  │
//! │  │ install/activate│  │   Dispatcher    │  │      Gateway                │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           │                    │                         │                   │
//! │           └────────────────────┼─────────────────────────┘                   │
//! │                                │                                             │
//! │                    ┌───────────┴───────────┐   ┌───────────────────────┐    │
//! │                    │  Cache Manager        │   │  Monitoring Daemon    │    │
//! │                    │  (generations)        │   │  (history windows)    │    │
//! │                    └───────────┬───────────┘   └───────────┬───────────┘    │
//! ├────────────────────────────────┼───────────────────────────┼────────────────┤
//! │                        Adapters│                           │                 │
//! │  ┌─────────────────┐  ┌────────┴────────┐       ┌──────────┴──────────┐     │
//! │  │  HTTP Fetcher   │  │ Memory / Local  │       │ Memory / REST       │     │
//! │  │  (origin)       │  │ storage         │       │ score ledger        │     │
//! │  └─────────────────┘  └─────────────────┘       └─────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`agent`]: Wiring and request interception
//! - [`api`]: Proxy listener and control routes
//! - [`cache`]: Generation-scoped response cache
//! - [`dispatch`]: Resource classification and caching strategies
//! - [`lifecycle`]: Install/activate state machine and client control
//! - [`monitor`]: Periodic score polling and anomaly detection
//! - [`messaging`]: Control messages and notifications
//! - [`ledger`] / [`network`]: External adapters
//! - [`domain`]: Core types and ports
//! - [`error`]: Error types and handling

pub mod agent;
pub mod api;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod messaging;
pub mod metrics;
pub mod monitor;
pub mod network;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use agent::{Agent, AgentStatus, Intercepted};
pub use api::{AgentRouter, ApiServer, ApiServerConfig};
pub use config::{AgentConfig, LedgerKind, StorageBackendKind};

pub use cache::{CacheKey, CacheLookupResult, CacheManager, GenerationStorage, LocalStorage, MemoryStorage};

pub use dispatch::{Classifier, ResourceClass, ResponseSource, Strategy, StrategyDispatcher};

pub use domain::ports::{
    AgentRequest, AgentResponse, Destination, Fetcher, NotificationRequest, NotificationSink,
    RequestMode, ResponseKind, ScoreLedger, ScoreRow,
};

pub use error::{Error, ErrorAction, Result};

pub use lifecycle::{LifecycleController, LifecycleState};
pub use messaging::{ControlMessage, MessagingGateway};
pub use metrics::AgentMetrics;
pub use monitor::{AnomalyEvent, MonitorConfig, MonitoringDaemon, TickReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
