//! Snapshot sinks: a JSON file for the binary, memory for tests

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{PersistenceError, SnapshotSink, envelope};
use crate::sim::RunSnapshot;

/// Keeps the run snapshot in a single enveloped JSON file
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotSink for FileStore {
    fn save(&mut self, snapshot: &RunSnapshot) -> Result<(), PersistenceError> {
        envelope::write(&self.path, snapshot)
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        envelope::remove(&self.path)
    }

    fn load(&mut self) -> Result<Option<RunSnapshot>, PersistenceError> {
        envelope::read(&self.path)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    saved: Option<RunSnapshot>,
    saves: usize,
    clears: usize,
}

/// In-memory sink. Clones share storage, so a test can keep a handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    /// Pre-populated store, as if a previous session had saved
    pub fn with_snapshot(snapshot: RunSnapshot) -> Self {
        let store = Self::default();
        store.lock().saved = Some(snapshot);
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn saved(&self) -> Option<RunSnapshot> {
        self.lock().saved.clone()
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    pub fn clear_count(&self) -> usize {
        self.lock().clears
    }
}

impl SnapshotSink for MemoryStore {
    fn save(&mut self, snapshot: &RunSnapshot) -> Result<(), PersistenceError> {
        let mut inner = self.lock();
        inner.saved = Some(snapshot.clone());
        inner.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        let mut inner = self.lock();
        inner.saved = None;
        inner.clears += 1;
        Ok(())
    }

    fn load(&mut self) -> Result<Option<RunSnapshot>, PersistenceError> {
        Ok(self.lock().saved.clone())
    }
}
