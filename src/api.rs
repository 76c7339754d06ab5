//! Wire records shared by the scoring client and server
//!
//! Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted player name, after trimming
pub const MAX_NAME_LEN: usize = 30;
/// Leaderboard size when the caller does not ask for one
pub const DEFAULT_LIMIT: usize = 5;
/// Largest leaderboard a caller may request
pub const MAX_LIMIT: usize = 50;

/// `POST /scores` body. Missing fields are validated, not rejected as bad JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreRequest {
    pub name: Option<String>,
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wedding_code: Option<String>,
}

/// `POST /scores` success body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_score: Option<u64>,
}

/// One public leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// `GET /config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub server_time_utc: DateTime<Utc>,
    #[serde(default)]
    pub deadline_utc: Option<DateTime<Utc>>,
}

/// `GET /me`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
}

/// One row of the admin listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminScoreEntry {
    pub name: String,
    pub score: u64,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// `GET /admin/scores`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminScoresResponse {
    pub total_submissions: usize,
    pub scores: Vec<AdminScoreEntry>,
}

/// `POST /admin/config` body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminConfigRequest {
    pub deadline_utc: Option<String>,
}

/// `POST /admin/config` success body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfigResponse {
    pub success: bool,
    pub deadline_utc: DateTime<Utc>,
}

/// `DELETE /admin/scores`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub success: bool,
    pub deleted_count: usize,
}

/// Every client error carries a machine-readable reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Clamp a raw `limit` query value. Unparseable means the default.
pub fn parse_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .map(|n| n.clamp(1, MAX_LIMIT as i64) as usize)
        .unwrap_or(DEFAULT_LIMIT)
}
