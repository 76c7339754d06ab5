//! Offline score fallback
//!
//! When the scoring backend is unreachable, finished runs are kept here and
//! shown as the leaderboard instead. Persisted to a JSON file; storage
//! failures are logged and otherwise ignored.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::LeaderboardEntry;
use crate::persistence::envelope;

/// A single locally recorded score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineEntry {
    pub name: String,
    pub score: u64,
    /// When the run finished
    pub timestamp: DateTime<Utc>,
}

/// Every score recorded while offline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfflineScores {
    pub entries: Vec<OfflineEntry>,
}

impl OfflineScores {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a score. Nothing is dropped; deduplication happens on read.
    pub fn record(&mut self, name: &str, score: u64, timestamp: DateTime<Utc>) {
        self.entries.push(OfflineEntry {
            name: name.to_string(),
            score,
            timestamp,
        });
    }

    /// Best score per case-insensitive name, descending, at most `limit`.
    /// The casing shown is the one the best entry was recorded with.
    pub fn top(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut by_name: HashMap<String, &OfflineEntry> = HashMap::new();
        for entry in &self.entries {
            let key = entry.name.trim().to_lowercase();
            match by_name.get(&key) {
                Some(best) if best.score >= entry.score => {}
                _ => {
                    by_name.insert(key, entry);
                }
            }
        }

        let mut best: Vec<LeaderboardEntry> = by_name
            .into_values()
            .map(|e| LeaderboardEntry {
                name: e.name.clone(),
                score: e.score,
                created_at: Some(e.timestamp),
            })
            .collect();
        best.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        best.truncate(limit);
        best
    }

    /// Best recorded score for a name, case-insensitive
    pub fn best_for(&self, name: &str) -> Option<u64> {
        let key = name.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.name.trim().to_lowercase() == key)
            .map(|e| e.score)
            .max()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load from disk, starting fresh on any failure
    pub fn load(path: &Path) -> Self {
        match envelope::read::<OfflineScores>(path) {
            Ok(Some(scores)) => {
                log::info!("Loaded {} offline scores", scores.entries.len());
                scores
            }
            Ok(None) => Self::new(),
            Err(e) => {
                log::warn!("Offline scores unreadable, starting fresh: {e}");
                Self::new()
            }
        }
    }

    pub fn save(&self, path: &Path) {
        match envelope::write(path, self) {
            Ok(()) => log::info!("Offline scores saved ({} entries)", self.entries.len()),
            Err(e) => log::warn!("Offline scores not saved: {e}"),
        }
    }

    /// Load, append, save
    pub fn append_to(path: &Path, name: &str, score: u64, timestamp: DateTime<Utc>) {
        let mut scores = Self::load(path);
        scores.record(name, score, timestamp);
        scores.save(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn top_keeps_best_per_name_case_insensitively() {
        let mut scores = OfflineScores::new();
        scores.record("ada", 120, at(1));
        scores.record("Ada", 300, at(2));
        scores.record("ADA", 200, at(3));
        scores.record("Grace", 250, at(4));

        let top = scores.top(5);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "Ada");
        assert_eq!(top[0].score, 300);
        assert_eq!(top[1].name, "Grace");
        assert_eq!(scores.best_for("aDa"), Some(300));
    }

    #[test]
    fn top_respects_limit() {
        let mut scores = OfflineScores::new();
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            scores.record(name, i as u64 * 10, at(i as i64));
        }
        let top = scores.top(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "d");
        assert_eq!(top[1].name, "c");
    }

    #[test]
    fn append_survives_reload() {
        let path = std::env::temp_dir()
            .join(format!("the-grind-offline-{}", std::process::id()))
            .join("offline_scores.json");
        OfflineScores::append_to(&path, "Ada", 42, at(10));
        OfflineScores::append_to(&path, "Ada", 7, at(11));
        let scores = OfflineScores::load(&path);
        assert_eq!(scores.entries.len(), 2);
        assert_eq!(scores.best_for("ada"), Some(42));
    }
}
