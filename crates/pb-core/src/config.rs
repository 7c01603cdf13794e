use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from `~/.config/pipeboard/config.toml`.
///
/// Every section is defaulted, so a missing file or a partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl Config {
    /// Load from the default path, falling back to defaults when the file
    /// does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load and validate a config from an explicit path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("pipeboard")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.board.validate()?;
        self.ui.validate()?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Board — drag, autopan and reconciliation tuning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Pointer travel (px) required before a pressed card starts dragging.
    #[serde(default = "default_activation_distance")]
    pub activation_distance: f32,
    /// Distance from the board's left/right edge (px) inside which autopan
    /// engages.
    #[serde(default = "default_autopan_edge_px")]
    pub autopan_edge_px: f32,
    /// Autopan speed (px per frame) at the outer rim of the edge band.
    #[serde(default = "default_autopan_min_speed")]
    pub autopan_min_speed: f32,
    /// Autopan speed (px per frame) when the pointer sits on the edge.
    #[serde(default = "default_autopan_max_speed")]
    pub autopan_max_speed: f32,
    /// When the board scroll is within this distance of its start/end while
    /// autopanning, the stage window pages to expose further stages.
    #[serde(default = "default_edge_page_px")]
    pub edge_page_px: f32,
    /// Cooldown (ms) between consecutive window page flips during one drag.
    #[serde(default = "default_edge_page_cooldown_ms")]
    pub edge_page_cooldown_ms: u64,
    /// Delay (ms) between a successful mutation and the background refetch
    /// that re-validates the working set. A race mitigation, not a guarantee.
    #[serde(default = "default_reconcile_delay_ms")]
    pub reconcile_delay_ms: u64,
    /// Viewport widths (px) above which the stage window grows to 2, 3 and 4
    /// columns. Below the first breakpoint a single column is shown.
    #[serde(default = "default_capacity_breakpoints")]
    pub capacity_breakpoints: Vec<f32>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            activation_distance: default_activation_distance(),
            autopan_edge_px: default_autopan_edge_px(),
            autopan_min_speed: default_autopan_min_speed(),
            autopan_max_speed: default_autopan_max_speed(),
            edge_page_px: default_edge_page_px(),
            edge_page_cooldown_ms: default_edge_page_cooldown_ms(),
            reconcile_delay_ms: default_reconcile_delay_ms(),
            capacity_breakpoints: default_capacity_breakpoints(),
        }
    }
}

impl BoardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.activation_distance < 0.0 {
            return Err(ConfigError::Validation(
                "board.activation_distance must be >= 0".to_string(),
            ));
        }
        if self.autopan_min_speed > self.autopan_max_speed {
            return Err(ConfigError::Validation(format!(
                "board.autopan_min_speed ({}) exceeds autopan_max_speed ({})",
                self.autopan_min_speed, self.autopan_max_speed
            )));
        }
        if self.autopan_edge_px <= 0.0 {
            return Err(ConfigError::Validation(
                "board.autopan_edge_px must be > 0".to_string(),
            ));
        }
        if self.capacity_breakpoints.len() > 3 {
            return Err(ConfigError::Validation(
                "board.capacity_breakpoints supports at most 3 entries (capacity 1-4)".to_string(),
            ));
        }
        if self.capacity_breakpoints.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Validation(
                "board.capacity_breakpoints must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_activation_distance() -> f32 {
    6.0
}

fn default_autopan_edge_px() -> f32 {
    150.0
}

fn default_autopan_min_speed() -> f32 {
    5.0
}

fn default_autopan_max_speed() -> f32 {
    30.0
}

fn default_edge_page_px() -> f32 {
    100.0
}

fn default_edge_page_cooldown_ms() -> u64 {
    300
}

fn default_reconcile_delay_ms() -> u64 {
    1000
}

fn default_capacity_breakpoints() -> Vec<f32> {
    vec![640.0, 980.0, 1320.0]
}

// ---------------------------------------------------------------------------
// Ui
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// How long a toast notification stays on screen.
    #[serde(default = "default_toast_duration_secs")]
    pub toast_duration_secs: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            toast_duration_secs: default_toast_duration_secs(),
        }
    }
}

impl UiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.toast_duration_secs == 0 {
            return Err(ConfigError::Validation(
                "ui.toast_duration_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_toast_duration_secs() -> u64 {
    4
}
