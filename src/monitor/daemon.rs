//! Monitoring Daemon
//!
//! Polls the score ledger on a fixed cadence, keeps a bounded history per
//! user and raises anomaly records when a score drops too far in one tick.
//!
//! Ticks are serialised: the timer and the connectivity trigger share one
//! lock, so two ticks never observe the same history concurrently.

use crate::domain::ports::{ScoreLedgerRef, ScoreRow};
use crate::error::{Error, Result};
use crate::ledger::LedgerCollections;
use crate::metrics::AgentMetrics;
use crate::monitor::anomaly::{
    detect, AdminNotification, AnomalyEvent, BackupRecord, DEFAULT_ANOMALY_THRESHOLD,
};
use crate::monitor::history::{HistoryBook, HistoryWindow, ScoreSample, DEFAULT_WINDOW_SIZE};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the monitoring daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between timed ticks
    pub interval_secs: u64,
    /// Drops strictly larger than this are anomalies
    pub anomaly_threshold: i64,
    /// Samples kept per user
    pub window_size: usize,
    /// Collections anomaly records go to
    pub collections: LedgerCollections,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            collections: LedgerCollections::default(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// =============================================================================
// Tick Report
// =============================================================================

/// What started a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickTrigger {
    Timer,
    ConnectivityRestored,
    Manual,
}

/// Summary of one completed tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub trigger: TickTrigger,
    /// Ledger rows observed
    pub rows: usize,
    /// Anomalies detected
    pub anomalies: usize,
    /// Anomaly record writes attempted
    pub writes_attempted: usize,
    /// Anomaly record writes that failed
    pub writes_failed: usize,
}

impl TickReport {
    fn outcome(&self) -> &'static str {
        if self.writes_failed > 0 {
            "partial"
        } else {
            "ok"
        }
    }
}

// =============================================================================
// Daemon
// =============================================================================

/// Timer-driven score monitor
pub struct MonitoringDaemon {
    config: MonitorConfig,
    ledger: ScoreLedgerRef,
    metrics: Arc<AgentMetrics>,
    history: Mutex<HistoryBook>,
    running: AtomicBool,
    /// Cancels the pending timer; `Some` while started
    timer: Mutex<Option<CancellationToken>>,
    /// Serialises ticks
    tick_lock: tokio::sync::Mutex<()>,
}

impl MonitoringDaemon {
    pub fn new(config: MonitorConfig, ledger: ScoreLedgerRef, metrics: Arc<AgentMetrics>) -> Arc<Self> {
        let history = HistoryBook::new(config.window_size);
        Arc::new(Self {
            config,
            ledger,
            metrics,
            history: Mutex::new(history),
            running: AtomicBool::new(false),
            timer: Mutex::new(None),
            tick_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Start the timer. Returns `false` if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut timer = self.timer.lock();
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Monitoring already running");
            return false;
        }

        let token = CancellationToken::new();
        *timer = Some(token.clone());

        let period = self.config.interval();
        let daemon = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // Errors are logged and counted inside
                        let _ = daemon.run_tick(TickTrigger::Timer).await;
                    }
                }
            }
            debug!("Monitoring timer stopped");
        });

        info!(
            interval_secs = self.config.interval_secs,
            ledger = self.ledger.ledger_name(),
            "Monitoring started"
        );
        true
    }

    /// Clear the pending timer. A tick already in flight runs to completion.
    /// Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let mut timer = self.timer.lock();
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(token) = timer.take() {
            token.cancel();
        }
        info!("Monitoring stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one tick now, outside the cadence
    pub async fn tick(&self) -> Result<TickReport> {
        self.run_tick(TickTrigger::Manual).await
    }

    /// Connectivity came back: poll immediately
    pub async fn trigger_now(&self) -> Result<TickReport> {
        self.run_tick(TickTrigger::ConnectivityRestored).await
    }

    /// Snapshot of a user's history window
    pub fn history(&self, user_id: &str) -> Option<HistoryWindow> {
        self.history.lock().get(user_id).cloned()
    }

    pub fn tracked_users(&self) -> usize {
        self.history.lock().len()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    async fn run_tick(&self, trigger: TickTrigger) -> Result<TickReport> {
        let _serialised = self.tick_lock.lock().await;

        let outcome = AssertUnwindSafe(self.poll(trigger)).catch_unwind().await;
        match outcome {
            Ok(Ok(report)) => {
                self.metrics
                    .monitor_ticks
                    .with_label_values(&[report.outcome()])
                    .inc();
                if report.anomalies > 0 {
                    info!(
                        trigger = ?report.trigger,
                        rows = report.rows,
                        anomalies = report.anomalies,
                        failed_writes = report.writes_failed,
                        "Monitoring tick completed"
                    );
                } else {
                    debug!(trigger = ?report.trigger, rows = report.rows, "Monitoring tick completed");
                }
                Ok(report)
            }
            Ok(Err(e)) => {
                self.metrics
                    .monitor_ticks
                    .with_label_values(&["ledger_unavailable"])
                    .inc();
                warn!(trigger = ?trigger, error = %e, "Monitoring tick aborted");
                Err(e)
            }
            Err(panic) => {
                self.metrics
                    .monitor_ticks
                    .with_label_values(&["panicked"])
                    .inc();
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(trigger = ?trigger, reason = %reason, "Monitoring tick panicked");
                Err(Error::Internal(format!("monitoring tick panicked: {}", reason)))
            }
        }
    }

    async fn poll(&self, trigger: TickTrigger) -> Result<TickReport> {
        let rows = self.ledger.read_scores().await.map_err(|e| match e {
            Error::LedgerUnavailable(_) => e,
            other => Error::LedgerUnavailable(other.to_string()),
        })?;

        let anomalies = self.observe(&rows);

        let mut report = TickReport {
            trigger,
            rows: rows.len(),
            anomalies: anomalies.len(),
            writes_attempted: 0,
            writes_failed: 0,
        };

        for (event, notification, backup) in &anomalies {
            self.metrics.anomalies.inc();
            warn!(
                user_id = %event.user_id,
                old_score = event.old_score,
                new_score = event.new_score,
                delta = event.delta,
                "Score anomaly detected"
            );

            let failed = self.write_records(event, notification, backup).await;
            report.writes_attempted += 3;
            report.writes_failed += failed;
            if failed > 0 {
                let partial = Error::PartialWrite {
                    attempted: 3,
                    failed,
                };
                warn!(user_id = %event.user_id, error = %partial, "Anomaly records incomplete");
            }
        }

        Ok(report)
    }

    /// Update every window and collect the anomalies this tick produced
    fn observe(&self, rows: &[ScoreRow]) -> Vec<(AnomalyEvent, AdminNotification, BackupRecord)> {
        let now = Utc::now();
        let threshold = self.config.anomaly_threshold;
        let mut anomalies = Vec::new();

        let mut book = self.history.lock();
        for row in rows {
            let window = book.window_mut(&row.user_id, &row.display_name);
            if let Some(event) = detect(window, row.total_score, threshold, now) {
                let notification = AdminNotification::for_anomaly(&event, &window.display_name);
                let backup = BackupRecord::for_anomaly(&event, window);
                anomalies.push((event, notification, backup));
            }
            window.push(ScoreSample {
                score: row.total_score,
                timestamp: now,
            });
        }
        self.metrics.tracked_users.set(book.len() as i64);

        anomalies
    }

    /// Three independent appends; returns how many failed
    async fn write_records(
        &self,
        event: &AnomalyEvent,
        notification: &AdminNotification,
        backup: &BackupRecord,
    ) -> usize {
        let collections = &self.config.collections;
        let (a, n, b) = futures::join!(
            self.append(&collections.anomalies, serde_json::to_value(event)),
            self.append(&collections.notifications, serde_json::to_value(notification)),
            self.append(&collections.backups, serde_json::to_value(backup)),
        );
        [a, n, b].iter().filter(|ok| !**ok).count()
    }

    async fn append(
        &self,
        collection: &str,
        record: std::result::Result<serde_json::Value, serde_json::Error>,
    ) -> bool {
        let result = match record {
            Ok(record) => self.ledger.append(collection, record).await,
            Err(e) => Err(Error::from(e)),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                self.metrics
                    .ledger_write_failures
                    .with_label_values(&[collection])
                    .inc();
                warn!(collection = %collection, error = %e, "Ledger write failed");
                false
            }
        }
    }
}
