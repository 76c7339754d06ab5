//! The Grind - a time-boxed incremental clicker game
//!
//! Core modules:
//! - `sim`: Run simulation (rates, events, state machine, engine controller)
//! - `tuning`: Data-driven game balance
//! - `persistence`: Snapshot save/restore behind a versioned envelope
//! - `submission`: Score reporting to the backend with offline fallback
//! - `server`: The scoring backend
//! - `platform`: Wall clock and data directory

pub mod api;
pub mod highscores;
pub mod persistence;
pub mod platform;
pub mod server;
pub mod settings;
pub mod sim;
pub mod submission;
pub mod tuning;

pub use highscores::OfflineScores;
pub use settings::{RunLength, ServerSettings, Settings};
pub use sim::{Engine, RunPhase, RunSnapshot, RunState};
pub use tuning::Tuning;

/// Game configuration constants
pub mod consts {
    /// Standard run length (8 minutes)
    pub const RUN_DURATION_MS: u64 = 8 * 60 * 1000;
    /// Short run for quick sessions and demos
    pub const SHORT_RUN_DURATION_MS: u64 = 20 * 1000;

    /// Geometric growth of generator prices
    pub const COST_SCALE: f64 = 1.15;
    /// Currency per tap before multipliers
    pub const BASE_TAP_VALUE: f64 = 1.0;
    /// Cap shared by every generator
    pub const MAX_OWNED: u32 = 10;

    /// Random event spacing, inclusive
    pub const EVENT_MIN_INTERVAL_MS: u64 = 25_000;
    pub const EVENT_MAX_INTERVAL_MS: u64 = 40_000;

    /// Minimum engine time between snapshot writes
    pub const SAVE_INTERVAL_MS: u64 = 2_000;

    /// Longest frame the simulation will integrate (tab was hidden, etc.)
    pub const MAX_TICK_DT_SECS: f64 = 1.0;
}
