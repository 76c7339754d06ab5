//! Player settings and server configuration
//!
//! Player settings persist as JSON in the data directory, separately from
//! run snapshots. Environment variables override the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{RUN_DURATION_MS, SHORT_RUN_DURATION_MS};

pub const API_URL_ENV: &str = "GRIND_API_URL";
pub const EVENT_CODE_ENV: &str = "GRIND_EVENT_CODE";
pub const BIND_ENV: &str = "GRIND_BIND";
pub const ADMIN_KEY_ENV: &str = "ADMIN_KEY";
pub const STORE_ENV: &str = "GRIND_STORE";

pub const DEFAULT_BIND: &str = "127.0.0.1:7071";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid bind address {0:?}")]
    Bind(String),
}

/// Run length presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RunLength {
    /// Quick 20 second run
    Short,
    #[default]
    Standard,
}

impl RunLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunLength::Short => "Short",
            RunLength::Standard => "Standard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "short" | "debug" => Some(RunLength::Short),
            "standard" | "std" | "full" => Some(RunLength::Standard),
            _ => None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            RunLength::Short => SHORT_RUN_DURATION_MS,
            RunLength::Standard => RUN_DURATION_MS,
        }
    }
}

/// Player-side settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub run_length: RunLength,

    // === Backend ===
    /// API root, e.g. `http://127.0.0.1:7071/api`. None plays offline.
    pub api_base: Option<String>,
    /// Event code sent along with scores
    pub event_code: Option<String>,

    // === Identity ===
    /// Stable per installation, generated on first load
    pub device_id: Option<String>,
    /// Last name the player entered
    pub player_name: Option<String>,
}

impl Settings {
    pub fn from_preset(run_length: RunLength) -> Self {
        Self {
            run_length,
            ..Self::default()
        }
    }

    pub fn try_load(path: &Path) -> Result<Option<Self>, SettingsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Load the file values, falling back to defaults. Always returns a
    /// device id. Environment overrides are not applied; see
    /// [`Settings::with_env_overrides`].
    pub fn load(path: &Path) -> Self {
        let mut settings = match Self::try_load(path) {
            Ok(Some(settings)) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Ok(None) => {
                log::info!("Using default settings");
                Self::default()
            }
            Err(e) => {
                log::warn!("{e}, using defaults");
                Self::default()
            }
        };

        if settings.ensure_device_id() {
            settings.save(path);
        }
        settings
    }

    /// Effective settings for this process. The file values in `self` are
    /// left alone so saving them never persists an override.
    pub fn with_env_overrides(&self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(&self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut effective = self.clone();
        effective.apply_overrides(lookup);
        effective
    }

    pub fn save(&self, path: &Path) {
        let result = (|| -> Result<(), SettingsError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let json = serde_json::to_string_pretty(self)?;
            std::fs::write(path, json).map_err(|source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })
        })();
        match result {
            Ok(()) => log::info!("Settings saved"),
            Err(e) => log::warn!("Settings not saved: {e}"),
        }
    }

    /// Environment wins over the file. Empty values unset the field.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV) {
            self.api_base = non_empty(url);
        }
        if let Some(code) = lookup(EVENT_CODE_ENV) {
            self.event_code = non_empty(code);
        }
    }

    /// Generate a device id if there is none. Returns true if one was made.
    pub fn ensure_device_id(&mut self) -> bool {
        if self.device_id.as_deref().is_some_and(|id| !id.is_empty()) {
            return false;
        }
        self.device_id = Some(generate_device_id());
        true
    }

    pub fn run_duration_ms(&self) -> u64 {
        self.run_length.duration_ms()
    }
}

/// Random 128-bit id as 32 lowercase hex digits
pub fn generate_device_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Scoring backend configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// Shared secret for the admin routes. None refuses every admin call.
    pub admin_key: Option<String>,
    /// JSON file backing the score store. None keeps scores in memory.
    pub store_path: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 7071)),
            admin_key: None,
            store_path: None,
        }
    }
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let bind_text = lookup(BIND_ENV)
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_text
            .parse()
            .map_err(|_| SettingsError::Bind(bind_text.clone()))?;

        Ok(Self {
            bind,
            admin_key: lookup(ADMIN_KEY_ENV).and_then(non_empty),
            store_path: lookup(STORE_ENV).and_then(non_empty).map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn run_length_presets() {
        assert_eq!(RunLength::from_str("SHORT"), Some(RunLength::Short));
        assert_eq!(RunLength::from_str("debug"), Some(RunLength::Short));
        assert_eq!(RunLength::from_str("nope"), None);
        assert_eq!(RunLength::Short.duration_ms(), 20_000);
        assert_eq!(RunLength::default().duration_ms(), 480_000);
        assert_eq!(RunLength::Standard.as_str(), "Standard");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut settings = Settings {
            api_base: Some("http://old/api".into()),
            event_code: Some("keep".into()),
            ..Settings::default()
        };
        settings.apply_overrides(env(&[(API_URL_ENV, "http://new/api")]));
        assert_eq!(settings.api_base.as_deref(), Some("http://new/api"));
        assert_eq!(settings.event_code.as_deref(), Some("keep"));

        settings.apply_overrides(env(&[(API_URL_ENV, "  ")]));
        assert_eq!(settings.api_base, None);
    }

    #[test]
    fn device_id_is_generated_once() {
        let mut settings = Settings::default();
        assert!(settings.ensure_device_id());
        let id = settings.device_id.clone().unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!settings.ensure_device_id());
        assert_eq!(settings.device_id.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn settings_survive_disk_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("the-grind-settings-{}", std::process::id()))
            .join("settings.json");
        let mut settings = Settings::from_preset(RunLength::Short);
        settings.player_name = Some("Ada".into());
        settings.save(&path);

        let loaded = Settings::try_load(&path).unwrap().unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn overrides_never_reach_the_file() {
        let path = std::env::temp_dir()
            .join(format!("the-grind-settings-overrides-{}", std::process::id()))
            .join("settings.json");
        let _ = std::fs::remove_file(&path);

        let mut stored = Settings::load(&path);
        let effective = stored.with_overrides(env(&[
            (API_URL_ENV, "http://from-env/api"),
            (EVENT_CODE_ENV, "gala"),
        ]));
        assert_eq!(effective.api_base.as_deref(), Some("http://from-env/api"));
        assert_eq!(effective.event_code.as_deref(), Some("gala"));
        assert_eq!(effective.device_id, stored.device_id);

        stored.player_name = Some("Ada".into());
        stored.save(&path);

        let reloaded = Settings::load(&path);
        assert_eq!(reloaded.api_base, None);
        assert_eq!(reloaded.event_code, None);
        assert_eq!(reloaded.player_name.as_deref(), Some("Ada"));
        assert_eq!(reloaded.with_overrides(env(&[])).api_base, None);
    }

    #[test]
    fn missing_settings_file_is_none() {
        let path = std::env::temp_dir().join("the-grind-no-such-settings.json");
        assert!(Settings::try_load(&path).unwrap().is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"playerName":"Grace"}"#).unwrap();
        assert_eq!(settings.run_length, RunLength::Standard);
        assert_eq!(settings.player_name.as_deref(), Some("Grace"));
    }

    #[test]
    fn server_settings_from_env() {
        let settings = ServerSettings::from_lookup(env(&[
            (BIND_ENV, "0.0.0.0:8080"),
            (ADMIN_KEY_ENV, "secret"),
        ]))
        .unwrap();
        assert_eq!(settings.bind.port(), 8080);
        assert_eq!(settings.admin_key.as_deref(), Some("secret"));
        assert_eq!(settings.store_path, None);

        let defaults = ServerSettings::from_lookup(env(&[])).unwrap();
        assert_eq!(defaults, ServerSettings::default());
    }

    #[test]
    fn bad_bind_is_rejected() {
        assert!(matches!(
            ServerSettings::from_lookup(env(&[(BIND_ENV, "not-an-addr")])),
            Err(SettingsError::Bind(_))
        ));
    }
}
