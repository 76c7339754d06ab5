//! Save/load of in-progress runs
//!
//! Features:
//! - Versioned JSON envelope
//! - Atomic writes (tmp → save)
//! - Corruption detection (unknown version or bad JSON is an error, never a panic)
//! - Debounced saving driven by engine time
//!
//! Storage is a cache during a live run, not a source of truth: the engine
//! never sees a storage error.

pub mod envelope;
pub mod store;

use thiserror::Error;

use crate::sim::{RunPhase, RunSnapshot};

pub use envelope::{Envelope, FORMAT_VERSION};
pub use store::{FileStore, MemoryStore};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported save format version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Somewhere a run snapshot can be kept
pub trait SnapshotSink {
    fn save(&mut self, snapshot: &RunSnapshot) -> Result<(), PersistenceError>;
    fn clear(&mut self) -> Result<(), PersistenceError>;
    fn load(&mut self) -> Result<Option<RunSnapshot>, PersistenceError>;
}

impl<S: SnapshotSink + ?Sized> SnapshotSink for Box<S> {
    fn save(&mut self, snapshot: &RunSnapshot) -> Result<(), PersistenceError> {
        (**self).save(snapshot)
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        (**self).clear()
    }

    fn load(&mut self) -> Result<Option<RunSnapshot>, PersistenceError> {
        (**self).load()
    }
}

/// Rate-limits saves and swallows every storage failure
pub struct Debounced<S> {
    sink: S,
    interval_ms: u64,
    last_save_at: Option<u64>,
}

impl<S: SnapshotSink> Debounced<S> {
    pub fn new(sink: S, interval_ms: u64) -> Self {
        Self {
            sink,
            interval_ms,
            last_save_at: None,
        }
    }

    /// Save unless the last save was less than the interval ago.
    ///
    /// A snapshot that is not running clears storage instead. Returns true
    /// when the sink was actually written.
    pub fn offer(&mut self, now: u64, snapshot: &RunSnapshot) -> bool {
        if let Some(last) = self.last_save_at {
            if now.saturating_sub(last) < self.interval_ms {
                return false;
            }
        }
        self.last_save_at = Some(now);

        if snapshot.phase != RunPhase::Running {
            self.clear();
            return false;
        }

        match self.sink.save(snapshot) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Run snapshot not saved: {e}");
                false
            }
        }
    }

    /// Forget any stored snapshot. Not rate-limited.
    pub fn clear(&mut self) {
        if let Err(e) = self.sink.clear() {
            log::warn!("Run snapshot not cleared: {e}");
        }
    }

    /// Read the stored snapshot; failures read as "nothing saved"
    pub fn load(&mut self) -> Option<RunSnapshot> {
        match self.sink.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Ignoring unreadable run snapshot: {e}");
                None
            }
        }
    }

    /// Allow the next offer through regardless of timing
    pub fn reset_timer(&mut self) {
        self.last_save_at = None;
    }
}
