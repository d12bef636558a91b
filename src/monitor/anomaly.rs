//! Anomaly detection and the records an anomaly produces

use crate::monitor::history::{HistoryWindow, ScoreSample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default magnitude of a drop that counts as an anomaly
pub const DEFAULT_ANOMALY_THRESHOLD: i64 = 100;

/// Admin notification type for score drops
pub const SCORE_ANOMALY_TYPE: &str = "score_anomaly";

// =============================================================================
// Records
// =============================================================================

/// A score drop beyond the threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub user_id: String,
    pub old_score: i64,
    pub new_score: i64,
    pub delta: i64,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Notification written for administrators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

/// Last known-good score before an anomaly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub user_id: String,
    pub display_name: String,
    pub score: i64,
    pub recorded_at: DateTime<Utc>,
    pub backed_up_at: DateTime<Utc>,
    pub reason: String,
}

// =============================================================================
// Detection
// =============================================================================

/// Compare a fresh score against a user's window. Strict: a drop of exactly
/// `threshold` is not an anomaly. Users never seen before are measured
/// against zero.
pub fn detect(
    window: &HistoryWindow,
    new_score: i64,
    threshold: i64,
    now: DateTime<Utc>,
) -> Option<AnomalyEvent> {
    let old_score = window.last_score();
    let delta = new_score.saturating_sub(old_score);
    if delta >= threshold.saturating_neg() {
        return None;
    }

    Some(AnomalyEvent {
        user_id: window.user_id.clone(),
        old_score,
        new_score,
        delta,
        timestamp: now,
        reason: format!(
            "score dropped by {} (threshold {})",
            delta.unsigned_abs(),
            threshold
        ),
    })
}

impl AdminNotification {
    pub fn for_anomaly(event: &AnomalyEvent, display_name: &str) -> Self {
        let who = if display_name.is_empty() {
            event.user_id.as_str()
        } else {
            display_name
        };
        Self {
            kind: SCORE_ANOMALY_TYPE.to_string(),
            title: "Score anomaly detected".to_string(),
            message: format!(
                "{} dropped from {} to {} ({})",
                who, event.old_score, event.new_score, event.delta
            ),
            payload: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
            timestamp: event.timestamp,
            is_read: false,
        }
    }
}

impl BackupRecord {
    /// Snapshot the last good sample. A window with no samples backs up the
    /// zero baseline at detection time.
    pub fn for_anomaly(event: &AnomalyEvent, window: &HistoryWindow) -> Self {
        let last_good = window.last().copied().unwrap_or(ScoreSample {
            score: event.old_score,
            timestamp: event.timestamp,
        });
        Self {
            user_id: event.user_id.clone(),
            display_name: window.display_name.clone(),
            score: last_good.score,
            recorded_at: last_good.timestamp,
            backed_up_at: event.timestamp,
            reason: event.reason.clone(),
        }
    }
}
