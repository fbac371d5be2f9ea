//! E2E tests for persistent configuration
//!
//! Tests config round-trip through disk, fallback to defaults, and the
//! engine configuration derived from it.

use delaymeter::{AppConfig, DelayMeter};
use tempfile::TempDir;

#[test]
fn test_save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = AppConfig {
        target: Some("Camera 2".to_string()),
        sample_rate: 44100,
        window_ms: 750,
        max_lag_ms: 250,
        debug: true,
    };
    config.save(&path).unwrap();

    assert!(path.exists(), "Parent directories are created");
    assert_eq!(AppConfig::load_from(&path), config);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::load_from(&dir.path().join("absent.json"));
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_corrupt_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert_eq!(AppConfig::load_from(&path), AppConfig::default());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"window_ms": 1500, "debug": true}"#).unwrap();

    let config = AppConfig::load_from(&path);
    assert_eq!(config.window_ms, 1500);
    assert!(config.debug);
    assert_eq!(config.max_lag_ms, 500);
    assert_eq!(config.sample_rate, 48000);
    assert_eq!(config.target, None);
}

#[test]
fn test_out_of_range_values_clamped_by_engine() {
    let config = AppConfig {
        window_ms: 60_000,
        max_lag_ms: 1,
        ..Default::default()
    };
    let meter = DelayMeter::new(config.engine_config()).unwrap();

    let engine = meter.config();
    assert_eq!(engine.analysis_window_ms, 3000);
    assert_eq!(engine.max_lag_search_ms, 50);
    assert_eq!(meter.sample_rate(), 48000);
}

#[test]
fn test_invalid_sample_rate_rejected() {
    let config = AppConfig {
        sample_rate: 0,
        ..Default::default()
    };
    assert!(DelayMeter::new(config.engine_config()).is_err());
}
