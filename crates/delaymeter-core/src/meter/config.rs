//! Engine tunables and their bounds

use crate::audio::correlation::ms_to_samples;
use crate::{BUFFER_SECONDS, DEFAULT_SAMPLE_RATE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest analysis window
pub const MIN_WINDOW_MS: u32 = 200;
/// Longest analysis window
pub const MAX_WINDOW_MS: u32 = 3000;
/// Analysis window used when none is configured
pub const DEFAULT_WINDOW_MS: u32 = 1000;

/// Smallest lag search range
pub const MIN_LAG_MS: u32 = 50;
/// Largest lag search range
pub const MAX_LAG_MS: u32 = 1500;
/// Lag search range used when none is configured
pub const DEFAULT_MAX_LAG_MS: u32 = 500;

/// Sample rates accepted by the engine
pub const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8000..=384000;

/// Errors raised when constructing an engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported sample rate: {0} Hz")]
    InvalidSampleRate(u32),
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_window_ms() -> u32 {
    DEFAULT_WINDOW_MS
}

fn default_max_lag_ms() -> u32 {
    DEFAULT_MAX_LAG_MS
}

/// Measurement configuration
///
/// `sample_rate` is fixed once an engine is built; the other fields can be
/// changed at any time through [`crate::DelayMeter::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample rate of both streams in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Length of the snapshot correlated per measurement
    #[serde(default = "default_window_ms")]
    pub analysis_window_ms: u32,
    /// Largest delay searched in either direction
    #[serde(default = "default_max_lag_ms")]
    pub max_lag_search_ms: u32,
    /// Log per-measurement diagnostics; never changes results
    #[serde(default)]
    pub debug_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            analysis_window_ms: default_window_ms(),
            max_lag_search_ms: default_max_lag_ms(),
            debug_enabled: false,
        }
    }
}

impl EngineConfig {
    /// Default configuration at the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }

    /// Set the analysis window, clamped to its bounds
    pub fn with_window_ms(mut self, ms: u32) -> Self {
        self.analysis_window_ms = ms.clamp(MIN_WINDOW_MS, MAX_WINDOW_MS);
        self
    }

    /// Set the lag search range, clamped to its bounds
    pub fn with_max_lag_ms(mut self, ms: u32) -> Self {
        self.max_lag_search_ms = ms.clamp(MIN_LAG_MS, MAX_LAG_MS);
        self
    }

    /// Enable or disable diagnostics
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_enabled = enabled;
        self
    }

    /// Copy with every tunable forced into its bounds
    pub fn clamped(self) -> Self {
        self.with_window_ms(self.analysis_window_ms)
            .with_max_lag_ms(self.max_lag_search_ms)
    }

    /// Check that the sample rate is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        Ok(())
    }

    /// Analysis window in samples
    pub fn window_frames(&self) -> usize {
        ms_to_samples(self.analysis_window_ms, self.sample_rate)
    }

    /// Lag search range in samples
    pub fn max_lag_samples(&self) -> usize {
        ms_to_samples(self.max_lag_search_ms, self.sample_rate)
    }

    /// Ring capacity per stream in samples
    pub fn buffer_capacity(&self) -> usize {
        ms_to_samples(BUFFER_SECONDS * 1000, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.analysis_window_ms, 1000);
        assert_eq!(config.max_lag_search_ms, 500);
        assert!(!config.debug_enabled);
    }

    #[test]
    fn test_bounds_are_enforced() {
        let config = EngineConfig::new(48000)
            .with_window_ms(50)
            .with_max_lag_ms(10_000);
        assert_eq!(config.analysis_window_ms, MIN_WINDOW_MS);
        assert_eq!(config.max_lag_search_ms, MAX_LAG_MS);

        let config = EngineConfig::new(48000)
            .with_window_ms(9000)
            .with_max_lag_ms(0);
        assert_eq!(config.analysis_window_ms, MAX_WINDOW_MS);
        assert_eq!(config.max_lag_search_ms, MIN_LAG_MS);
    }

    #[test]
    fn test_clamped() {
        let raw = EngineConfig {
            sample_rate: 44100,
            analysis_window_ms: 1,
            max_lag_search_ms: 2000,
            debug_enabled: true,
        };
        let config = raw.clamped();
        assert_eq!(config.analysis_window_ms, 200);
        assert_eq!(config.max_lag_search_ms, 1500);
        assert_eq!(config.sample_rate, 44100);
        assert!(config.debug_enabled);
    }

    #[test]
    fn test_sample_counts() {
        let config = EngineConfig::new(48000)
            .with_window_ms(1000)
            .with_max_lag_ms(500);
        assert_eq!(config.window_frames(), 48000);
        assert_eq!(config.max_lag_samples(), 24000);
        assert_eq!(config.buffer_capacity(), 240_000);
    }

    #[test]
    fn test_validate_sample_rate() {
        assert!(EngineConfig::new(44100).validate().is_ok());
        assert_eq!(
            EngineConfig::new(0).validate(),
            Err(ConfigError::InvalidSampleRate(0))
        );
        assert!(EngineConfig::new(1_000_000).validate().is_err());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"{"analysis_window_ms": 750}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.analysis_window_ms, 750);
        assert_eq!(config.max_lag_search_ms, 500);
        assert_eq!(config.sample_rate, 48000);
        assert!(!config.debug_enabled);
    }
}
