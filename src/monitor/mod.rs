//! Score Anomaly Monitoring
//!
//! An independent timer loop that watches the shared leaderboard for sudden
//! score drops.
//!
//! ```text
//!   interval / connectivity trigger
//!              │
//!              ▼
//!   ┌────────────────────┐   read_scores    ┌──────────────┐
//!   │  MonitoringDaemon  │ ───────────────► │ ScoreLedger  │
//!   │   HistoryBook      │ ◄─────────────── │              │
//!   └─────────┬──────────┘                  └──────▲───────┘
//!             │ delta < -threshold                 │
//!             ▼                                    │ append (x3, independent)
//!   AnomalyEvent + AdminNotification + BackupRecord┘
//! ```

pub mod anomaly;
pub mod daemon;
pub mod history;

pub use anomaly::{detect, AdminNotification, AnomalyEvent, BackupRecord};
pub use daemon::{MonitorConfig, MonitoringDaemon, TickReport, TickTrigger};
pub use history::{HistoryWindow, ScoreSample};
