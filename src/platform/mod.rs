//! Platform abstraction layer
//!
//! The one place that touches the host:
//! - Wall clock (milliseconds since the Unix epoch)
//! - Data directory for settings, snapshots and offline scores

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Override for the data directory
pub const DATA_DIR_ENV: &str = "GRIND_DATA_DIR";

const SETTINGS_FILE: &str = "settings.json";
const RUN_FILE: &str = "run.json";
const OFFLINE_SCORES_FILE: &str = "offline_scores.json";

/// Current wall-clock time in engine milliseconds
pub fn now_ms() -> u64 {
    to_ms(Utc::now())
}

/// Engine milliseconds for a UTC instant; instants before 1970 clamp to zero
pub fn to_ms(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_millis()).unwrap_or(0)
}

/// Local-clock time of a server-set deadline. `server_now` and `local_now`
/// describe the same instant, so their difference is the clock skew.
pub fn local_deadline(server_now: DateTime<Utc>, deadline: DateTime<Utc>, local_now: u64) -> u64 {
    let skew = i128::from(to_ms(server_now)) - i128::from(local_now);
    let local = i128::from(to_ms(deadline)) - skew;
    u64::try_from(local.max(0)).unwrap_or(u64::MAX)
}

/// Where local files live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$GRIND_DATA_DIR`, else `$HOME/.the-grind`, else `./.the-grind`
    pub fn from_env() -> Self {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            return Self::new(dir);
        }
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".the-grind"))
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    /// In-progress run snapshot
    pub fn run_path(&self) -> PathBuf {
        self.root.join(RUN_FILE)
    }

    pub fn offline_scores_path(&self) -> PathBuf {
        self.root.join(OFFLINE_SCORES_FILE)
    }
}
