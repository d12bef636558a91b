//! Score Ledger Adapters
//!
//! Implementations of the [`ScoreLedger`](crate::domain::ports::ScoreLedger)
//! port: a REST client for the shared leaderboard service and an in-memory
//! ledger for standalone runs.

pub mod memory;
pub mod rest;

pub use memory::MemoryScoreLedger;
pub use rest::{RestLedgerConfig, RestScoreLedger};

use serde::{Deserialize, Serialize};

/// Names of the collections anomaly records are appended to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerCollections {
    pub anomalies: String,
    pub notifications: String,
    pub backups: String,
}

impl Default for LedgerCollections {
    fn default() -> Self {
        Self {
            anomalies: "score_anomalies".to_string(),
            notifications: "admin_notifications".to_string(),
            backups: "score_backups".to_string(),
        }
    }
}
