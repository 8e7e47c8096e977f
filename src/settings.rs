//! Persisted user settings and the key-value stores behind them.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

pub const SETTINGS_KEY: &str = "claimwatch_settings";
pub const MAX_FEEDBACK_RATING: u8 = 5;

/// Simulation speed selector: 1 = slow, 2 = medium, 3 = fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SimSpeed { Slow, #[default] Medium, Fast }

impl SimSpeed {
    pub fn stage_delay(&self) -> Duration {
        Duration::from_millis(match self {
            SimSpeed::Slow => 2000,
            SimSpeed::Medium => 1000,
            SimSpeed::Fast => 500,
        })
    }
}

impl TryFrom<u8> for SimSpeed {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(SimSpeed::Slow),
            2 => Ok(SimSpeed::Medium),
            3 => Ok(SimSpeed::Fast),
            other => Err(format!("simSpeed must be 1, 2 or 3 (got {other})")),
        }
    }
}

impl From<SimSpeed> for u8 {
    fn from(s: SimSpeed) -> u8 {
        match s {
            SimSpeed::Slow => 1,
            SimSpeed::Medium => 2,
            SimSpeed::Fast => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_sim: bool,
    pub sim_speed: SimSpeed,
    #[serde(deserialize_with = "lenient_rating")]
    pub feedback_rating: u8,
}

/// Any stored number is accepted and clamped to 0..=5, so one bad rating
/// does not discard the other fields.
fn lenient_rating<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(d)?;
    Ok(raw.round().clamp(0.0, MAX_FEEDBACK_RATING as f64) as u8)
}

impl Default for Settings {
    fn default() -> Self { Self { auto_sim: false, sim_speed: SimSpeed::Medium, feedback_rating: 0 } }
}

/// String key-value storage (the shape of browser local storage).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.map.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.map.lock().map_err(poisoned)?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON object file holding every key.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into(), lock: Mutex::new(()) } }

    pub fn in_dir(dir: &Path) -> Self { Self::new(dir.join("storage.json")) }

    fn read_map(&self) -> StorageResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        // an unreadable file is replaced rather than blocking every save
        let mut map = self.read_map().unwrap_or_default();
        map.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() { std::fs::create_dir_all(parent)?; }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&map)?)?;
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "storage lock poisoned"))
}

/// Loads settings; absent or malformed content yields defaults.
pub fn load_settings(store: &dyn KeyValueStore) -> Settings {
    match store.get(SETTINGS_KEY) {
        Ok(Some(raw)) => match serde_json::from_str::<Settings>(&raw) {
            Ok(mut s) => {
                s.feedback_rating = s.feedback_rating.min(MAX_FEEDBACK_RATING);
                debug!(?s, "settings loaded");
                s
            }
            Err(e) => {
                warn!(error = %StorageError::from(e), "ignoring malformed settings");
                Settings::default()
            }
        },
        Ok(None) => Settings::default(),
        Err(e) => {
            warn!(error = %e, "failed to load settings");
            Settings::default()
        }
    }
}

/// Persists settings. Failures are logged and swallowed.
pub fn save_settings(store: &dyn KeyValueStore, settings: &Settings) {
    let res = serde_json::to_string(settings)
        .map_err(StorageError::from)
        .and_then(|raw| store.set(SETTINGS_KEY, &raw));
    if let Err(e) = res {
        warn!(error = %e, "failed to save settings");
    }
}
