use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Preference key under which the last selected pipeline id is stored.
pub const LAST_PIPELINE_KEY: &str = "last_pipeline";

#[derive(Debug, thiserror::Error)]
pub enum PrefStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PrefFile {
    values: HashMap<String, String>,
}

/// File-system-backed key-value preference persistence.
///
/// Preferences are stored as a single JSON file under a configurable
/// directory (defaults to `~/.config/pipeboard/`). Values are opaque strings;
/// callers own their encoding.
pub struct PrefStore {
    base_dir: PathBuf,
}

impl PrefStore {
    /// Create a store with the default directory (`~/.config/pipeboard/`).
    pub fn default_path() -> Self {
        let base = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("pipeboard");
        Self { base_dir: base }
    }

    /// Create a store backed by a custom directory (useful for testing).
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn prefs_path(&self) -> PathBuf {
        self.base_dir.join("prefs.json")
    }

    fn read_file(&self) -> Result<PrefFile, PrefStoreError> {
        let path = self.prefs_path();
        if !path.exists() {
            return Ok(PrefFile::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Fetch a preference value. Returns `None` when unset or unreadable —
    /// a corrupt or missing preference file is never fatal.
    pub fn get(&self, key: &str) -> Option<String> {
        self.read_file().ok()?.values.get(key).cloned()
    }

    /// Persist a preference value.
    pub fn set(&self, key: &str, value: &str) -> Result<(), PrefStoreError> {
        std::fs::create_dir_all(&self.base_dir)?;
        let mut file = self.read_file()?;
        file.values.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(self.prefs_path(), json)?;
        Ok(())
    }

    /// Remove a preference value.
    pub fn unset(&self, key: &str) -> Result<(), PrefStoreError> {
        let mut file = self.read_file()?;
        if file.values.remove(key).is_some() {
            let json = serde_json::to_string_pretty(&file)?;
            std::fs::write(self.prefs_path(), json)?;
        }
        Ok(())
    }
}
