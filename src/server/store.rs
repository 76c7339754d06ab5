//! Score records and the event deadline
//!
//! Pure bookkeeping: every method takes the current time as an argument.
//! When opened with a path, the whole store is rewritten through the
//! persistence envelope after each mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{
    AdminScoreEntry, AdminScoresResponse, LeaderboardEntry, MAX_NAME_LEN, MeResponse, ScoreRequest,
};
use crate::persistence::{PersistenceError, envelope};

/// One player's stored best
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub id: u64,
    pub name: String,
    pub score: u64,
    pub device_id: Option<String>,
    pub event_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Why a submission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalid {
    MissingFields,
    NameTooLong,
}

impl Invalid {
    pub fn message(&self) -> &'static str {
        match self {
            Invalid::MissingFields => "Name and positive score required",
            Invalid::NameTooLong => "Name too long (max 30 chars)",
        }
    }
}

/// What a valid submission did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// No earlier record for this device or name
    Created,
    /// Beat the stored best
    Improved,
    /// Stored best was equal or higher
    Kept { best: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoreData {
    next_id: u64,
    records: Vec<ScoreRecord>,
    deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct ScoreStore {
    data: StoreData,
    path: Option<PathBuf>,
}

impl ScoreStore {
    /// Memory-only store
    pub fn new() -> Self {
        Self::default()
    }

    /// File-backed store. A missing file starts empty.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let data = envelope::read::<StoreData>(path)?.unwrap_or_default();
        log::info!(
            "Score store {} opened with {} records",
            path.display(),
            data.records.len()
        );
        Ok(Self {
            data,
            path: Some(path.to_path_buf()),
        })
    }

    fn persist(&self) {
        if let Some(path) = &self.path {
            if let Err(e) = envelope::write(path, &self.data) {
                log::warn!("Score store not saved: {e}");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.data.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.records.is_empty()
    }

    pub fn records(&self) -> &[ScoreRecord] {
        &self.data.records
    }

    /// Validate and apply a submission.
    ///
    /// A record with the same device id wins; otherwise a record with the
    /// same case-insensitive trimmed name. The stored score only ever goes up.
    pub fn submit(&mut self, request: &ScoreRequest, now: DateTime<Utc>) -> Result<Submitted, Invalid> {
        let name = request.name.as_deref().map(str::trim).unwrap_or_default();
        let score = request.score.unwrap_or(0);
        if name.is_empty() || score <= 0 {
            return Err(Invalid::MissingFields);
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(Invalid::NameTooLong);
        }
        let score = score as u64;
        let device_id = request
            .device_id
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());

        let by_device = device_id.and_then(|device| {
            self.data
                .records
                .iter()
                .position(|r| r.device_id.as_deref() == Some(device))
        });
        let existing = by_device.or_else(|| {
            self.data
                .records
                .iter()
                .position(|r| same_name(&r.name, name))
        });

        let outcome = match existing {
            Some(index) => {
                let record = &mut self.data.records[index];
                if score > record.score {
                    record.score = score;
                    record.name = name.to_string();
                    if let Some(device) = device_id {
                        record.device_id = Some(device.to_string());
                    }
                    record.created_at = now;
                    Submitted::Improved
                } else {
                    return Ok(Submitted::Kept { best: record.score });
                }
            }
            None => {
                self.data.next_id += 1;
                self.data.records.push(ScoreRecord {
                    id: self.data.next_id,
                    name: name.to_string(),
                    score,
                    device_id: device_id.map(str::to_string),
                    event_code: request.wedding_code.clone().filter(|c| !c.trim().is_empty()),
                    created_at: now,
                });
                Submitted::Created
            }
        };

        log::info!("Score {score} for {name}: {outcome:?}");
        self.persist();
        Ok(outcome)
    }

    /// Best entry per case-insensitive name, descending
    pub fn top(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut best: HashMap<String, &ScoreRecord> = HashMap::new();
        for record in &self.data.records {
            let key = record.name.trim().to_lowercase();
            match best.get(&key) {
                Some(current) if current.score >= record.score => {}
                _ => {
                    best.insert(key, record);
                }
            }
        }

        let mut rows: Vec<&ScoreRecord> = best.into_values().collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        rows.into_iter()
            .take(limit)
            .map(|r| LeaderboardEntry {
                name: r.name.clone(),
                score: r.score,
                created_at: Some(r.created_at),
            })
            .collect()
    }

    /// Identity and best score of a returning device
    pub fn me(&self, device_id: Option<&str>) -> MeResponse {
        let Some(device) = device_id.map(str::trim).filter(|d| !d.is_empty()) else {
            return MeResponse::default();
        };
        self.data
            .records
            .iter()
            .filter(|r| r.device_id.as_deref() == Some(device))
            .max_by_key(|r| r.score)
            .map(|r| MeResponse {
                found: true,
                name: Some(r.name.clone()),
                score: Some(r.score),
            })
            .unwrap_or_default()
    }

    /// Every record, highest first
    pub fn admin_listing(&self) -> AdminScoresResponse {
        let mut rows: Vec<&ScoreRecord> = self.data.records.iter().collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        AdminScoresResponse {
            total_submissions: rows.len(),
            scores: rows
                .into_iter()
                .map(|r| AdminScoreEntry {
                    name: r.name.clone(),
                    score: r.score,
                    device_id: r.device_id.clone(),
                    created_at: r.created_at,
                })
                .collect(),
        }
    }

    /// Drop every record. The deadline is kept.
    pub fn clear(&mut self) -> usize {
        let deleted = self.data.records.len();
        self.data.records.clear();
        log::info!("Deleted {deleted} score records");
        self.persist();
        deleted
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.data.deadline
    }

    pub fn set_deadline(&mut self, deadline: DateTime<Utc>) {
        self.data.deadline = Some(deadline);
        log::info!("Deadline set to {}", deadline.to_rfc3339());
        self.persist();
    }
}

fn same_name(stored: &str, submitted: &str) -> bool {
    stored.trim().to_lowercase() == submitted.to_lowercase()
}
