//! In-memory score ledger

use crate::domain::ports::{ScoreLedger, ScoreRow};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Ledger held in process memory
///
/// Failure switches make it usable as a test double for outages and
/// partial writes.
pub struct MemoryScoreLedger {
    rows: RwLock<Vec<ScoreRow>>,
    records: DashMap<String, Vec<serde_json::Value>>,
    unavailable: AtomicBool,
    failing_collections: RwLock<HashSet<String>>,
    read_delay: RwLock<Option<Duration>>,
    reads: AtomicU64,
}

impl Default for MemoryScoreLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScoreLedger {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            records: DashMap::new(),
            unavailable: AtomicBool::new(false),
            failing_collections: RwLock::new(HashSet::new()),
            read_delay: RwLock::new(None),
            reads: AtomicU64::new(0),
        }
    }

    /// Replace the leaderboard contents
    pub fn set_rows(&self, rows: Vec<ScoreRow>) {
        *self.rows.write() = rows;
    }

    /// Insert or update one user's score
    pub fn set_score(&self, user_id: &str, display_name: &str, total_score: i64) {
        let mut rows = self.rows.write();
        match rows.iter_mut().find(|r| r.user_id == user_id) {
            Some(row) => {
                row.display_name = display_name.to_string();
                row.total_score = total_score;
            }
            None => rows.push(ScoreRow::new(user_id, display_name, total_score)),
        }
    }

    /// Make reads fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make appends to one collection fail
    pub fn fail_collection(&self, collection: &str) {
        self.failing_collections.write().insert(collection.to_string());
    }

    /// Delay every read
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.write() = delay;
    }

    /// Records appended to a collection, in order
    pub fn records(&self, collection: &str) -> Vec<serde_json::Value> {
        self.records
            .get(collection)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Number of `read_scores` calls so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoreLedger for MemoryScoreLedger {
    async fn read_scores(&self) -> Result<Vec<ScoreRow>> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let delay = *self.read_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::LedgerUnavailable("memory ledger switched off".into()));
        }

        let mut rows = self.rows.read().clone();
        rows.sort_by(|a, b| b.total_score.cmp(&a.total_score));
        Ok(rows)
    }

    async fn append(&self, collection: &str, record: serde_json::Value) -> Result<()> {
        if self.failing_collections.read().contains(collection) {
            return Err(Error::LedgerWrite {
                collection: collection.to_string(),
                reason: "collection rejects writes".into(),
            });
        }
        self.records
            .entry(collection.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    fn ledger_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_rows_sorted_descending() {
        let ledger = MemoryScoreLedger::new();
        ledger.set_score("a", "Ada", 10);
        ledger.set_score("b", "Bob", 30);
        ledger.set_score("c", "Cy", 20);
        ledger.set_score("a", "Ada", 40);

        let rows = assert_ok!(ledger.read_scores().await);
        let ids: Vec<_> = rows.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(ledger.read_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let ledger = MemoryScoreLedger::new();
        ledger.set_unavailable(true);
        assert_matches!(ledger.read_scores().await, Err(Error::LedgerUnavailable(_)));

        ledger.fail_collection("score_backups");
        assert_matches!(
            ledger.append("score_backups", serde_json::json!({})).await,
            Err(Error::LedgerWrite { .. })
        );
        assert_ok!(
            ledger
                .append("score_anomalies", serde_json::json!({"delta": -150}))
                .await
        );
        assert_eq!(ledger.records("score_anomalies").len(), 1);
        assert!(ledger.records("score_backups").is_empty());

        ledger.set_unavailable(false);
        assert_ok!(ledger.read_scores().await);
    }

    #[tokio::test]
    async fn test_read_delay_holds_the_read() {
        tokio::time::pause();
        let ledger = MemoryScoreLedger::new();
        ledger.set_read_delay(Some(std::time::Duration::from_secs(5)));

        let mut read = tokio_test::task::spawn(ledger.read_scores());
        assert!(read.poll().is_pending());

        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        match read.poll() {
            std::task::Poll::Ready(result) => assert_ok!(result),
            std::task::Poll::Pending => panic!("read still pending after delay"),
        };
        ledger.set_unavailable(true);
        assert_err!(ledger.read_scores().await);
    }
}
