//! Per-user score history
//!
//! Each observed user gets a bounded window of their most recent scores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Default number of samples kept per user
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// One observed score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSample {
    pub score: i64,
    pub timestamp: DateTime<Utc>,
}

/// Rolling record of a user's recent scores, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub user_id: String,
    pub display_name: String,
    scores: VecDeque<ScoreSample>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            scores: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Most recent sample
    pub fn last(&self) -> Option<&ScoreSample> {
        self.scores.back()
    }

    /// Most recent score, zero for a user never seen
    pub fn last_score(&self) -> i64 {
        self.last().map(|s| s.score).unwrap_or(0)
    }

    /// Append a sample, dropping the oldest beyond capacity
    pub fn push(&mut self, sample: ScoreSample) {
        self.scores.push_back(sample);
        while self.scores.len() > self.capacity {
            self.scores.pop_front();
        }
    }

    pub fn scores(&self) -> impl Iterator<Item = &ScoreSample> {
        self.scores.iter()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Windows for every observed user
#[derive(Debug, Default)]
pub struct HistoryBook {
    windows: HashMap<String, HistoryWindow>,
    capacity: usize,
}

impl HistoryBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: HashMap::new(),
            capacity,
        }
    }

    /// Look up or create the window for a user. The display name follows
    /// the ledger.
    pub fn window_mut(&mut self, user_id: &str, display_name: &str) -> &mut HistoryWindow {
        let capacity = self.capacity;
        let window = self
            .windows
            .entry(user_id.to_string())
            .or_insert_with(|| HistoryWindow::new(user_id, display_name, capacity));
        if !display_name.is_empty() && window.display_name != display_name {
            window.display_name = display_name.to_string();
        }
        window
    }

    pub fn get(&self, user_id: &str) -> Option<&HistoryWindow> {
        self.windows.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(score: i64) -> ScoreSample {
        ScoreSample {
            score,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_window_is_bounded() {
        let mut window = HistoryWindow::new("u1", "Ada", DEFAULT_WINDOW_SIZE);
        for score in 0..25 {
            window.push(sample(score));
            assert!(window.len() <= DEFAULT_WINDOW_SIZE);
        }

        let kept: Vec<i64> = window.scores().map(|s| s.score).collect();
        assert_eq!(kept, (15..25).collect::<Vec<_>>());
        assert_eq!(window.last_score(), 24);
    }

    #[test]
    fn test_new_user_baseline_is_zero() {
        let window = HistoryWindow::new("u1", "Ada", DEFAULT_WINDOW_SIZE);
        assert!(window.is_empty());
        assert_eq!(window.last_score(), 0);
    }

    #[test]
    fn test_book_creates_once_and_tracks_name() {
        let mut book = HistoryBook::new(3);
        book.window_mut("u1", "Ada").push(sample(10));
        book.window_mut("u1", "Ada L.").push(sample(20));

        assert_eq!(book.len(), 1);
        let window = book.get("u1").unwrap();
        assert_eq!(window.display_name, "Ada L.");
        assert_eq!(window.len(), 2);
        assert_eq!(window.capacity(), 3);
    }
}
