//! Versioned JSON envelope with atomic file writes

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::PersistenceError;

/// Bump when a stored payload changes shape
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            payload,
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `value` wrapped in an envelope. The target is replaced atomically.
pub fn write<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_vec(&Envelope::new(value))?;
    let tmp = tmp_path(path);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read an enveloped value. A missing file is `Ok(None)`.
pub fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
    if envelope.version != FORMAT_VERSION {
        return Err(PersistenceError::Version {
            found: envelope.version,
            expected: FORMAT_VERSION,
        });
    }
    Ok(Some(envelope.payload))
}

/// Delete the file if present
pub fn remove(path: &Path) -> Result<(), PersistenceError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
