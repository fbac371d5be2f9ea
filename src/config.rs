//! Persistent application configuration
//!
//! Stores the target selection and measurement tunables in a JSON file at
//! `<data_dir>/delaymeter/config.json`.

use delaymeter_core::meter::config::{DEFAULT_MAX_LAG_MS, DEFAULT_WINDOW_MS};
use delaymeter_core::EngineConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_sample_rate() -> u32 {
    delaymeter_core::DEFAULT_SAMPLE_RATE
}

fn default_window_ms() -> u32 {
    DEFAULT_WINDOW_MS
}

fn default_max_lag_ms() -> u32 {
    DEFAULT_MAX_LAG_MS
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the target stream (None = no target remembered)
    #[serde(default)]
    pub target: Option<String>,
    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Analysis window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u32,
    /// Lag search range in milliseconds
    #[serde(default = "default_max_lag_ms")]
    pub max_lag_ms: u32,
    /// Per-measurement diagnostics
    #[serde(default)]
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target: None,
            sample_rate: default_sample_rate(),
            window_ms: default_window_ms(),
            max_lag_ms: default_max_lag_ms(),
            debug: false,
        }
    }
}

impl AppConfig {
    /// Config file path: `<data_dir>/delaymeter/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("delaymeter")
            .join("config.json")
    }

    /// Load config from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load settings from `path`, falling back to defaults on any error
    ///
    /// Unknown or missing fields take their defaults, so settings files
    /// written by older versions keep loading.
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::info!(path = %path.display(), error = %e, "No saved meter settings, using defaults");
                return Self::default();
            }
        };

        serde_json::from_str::<Self>(&contents)
            .map(|config| {
                tracing::info!(
                    path = %path.display(),
                    stream = ?config.target,
                    window_ms = config.window_ms,
                    max_lag_ms = config.max_lag_ms,
                    "Meter settings loaded"
                );
                config
            })
            .unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Meter settings unreadable, using defaults");
                Self::default()
            })
    }

    /// Persist settings as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create settings directory {}", dir.display()))?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Cannot write meter settings to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Meter settings saved");
        Ok(())
    }

    /// Engine configuration with window and lag clamped into bounds
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.sample_rate)
            .with_window_ms(self.window_ms)
            .with_max_lag_ms(self.max_lag_ms)
            .with_debug(self.debug)
    }
}
