//! Measurement outcomes and their operator-facing texts

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

/// Reasons a measurement (or applying its offset) did not produce a result
///
/// None of these are fatal: the engine keeps its buffers and configuration
/// and records an invalid [`MeasurementResult`] carrying the reason.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeasurementError {
    #[error("No target source")]
    NoTarget,

    #[error("Buffers too small")]
    InsufficientData { available: usize, required: usize },

    #[error("Insufficient correlation - check audio levels and similarity")]
    LowConfidence { best_correlation: Option<f64> },

    #[error("Snapshot allocation failed")]
    AllocationFailure { frames: usize },

    #[error("No recent measurement")]
    NoRecentMeasurement,

    #[error("No parent source")]
    NoParentSource,

    #[error("Parent unavailable")]
    ParentUnavailable,
}

impl MeasurementError {
    /// Operator guidance shown alongside the reason
    pub fn notes(&self) -> String {
        match self {
            MeasurementError::NoTarget => {
                "Select a delayed source to compare against.".to_string()
            }
            MeasurementError::InsufficientData {
                available,
                required,
            } => format!(
                "Need more buffered audio from both reference and target before measuring \
                 ({} of {} samples).",
                available, required
            ),
            MeasurementError::LowConfidence {
                best_correlation: Some(c),
            } => format!(
                "Insufficient correlation ({:.3}); ensure both sources carry similar program audio.",
                c
            ),
            MeasurementError::LowConfidence {
                best_correlation: None,
            } => "No usable signal; ensure both sources carry similar program audio.".to_string(),
            MeasurementError::AllocationFailure { frames } => {
                format!("Could not allocate a {} sample snapshot.", frames)
            }
            MeasurementError::NoRecentMeasurement => {
                "Run Measure Now before applying offset.".to_string()
            }
            MeasurementError::NoParentSource => {
                "Cannot apply offset without a parent source.".to_string()
            }
            MeasurementError::ParentUnavailable => {
                "Parent source vanished before applying offset.".to_string()
            }
        }
    }
}

/// How the target relates to the reference in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Target arrives later than the reference (positive delay)
    Lags,
    /// Target arrives earlier than the reference (negative delay)
    Leads,
    /// No measurable offset
    Aligned,
}

impl Direction {
    /// Direction of a signed delay
    pub fn of(delay_ms: f64) -> Self {
        if delay_ms > 0.0 {
            Direction::Lags
        } else if delay_ms < 0.0 {
            Direction::Leads
        } else {
            Direction::Aligned
        }
    }
}

/// A successful measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    /// Delay in milliseconds, positive when the target lags
    pub delay_ms: f64,
    /// Best lag in samples
    pub lag_samples: i64,
    /// Pearson correlation at the best lag
    pub confidence: f64,
    /// Frames per snapshot
    pub frames: usize,
    /// Lags with a defined correlation
    pub lag_count: usize,
    /// Searched lag range in ms when narrower than configured
    pub effective_max_lag_ms: Option<f64>,
}

impl Measurement {
    /// Direction of the measured delay
    pub fn direction(&self) -> Direction {
        Direction::of(self.delay_ms)
    }
}

/// Immutable record of the latest measurement, as shown to an operator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementResult {
    /// Delay in milliseconds, positive when the target lags
    pub delay_ms: f64,
    /// Pearson correlation in [-1, 1] at the chosen lag
    pub confidence: f64,
    /// Chosen lag in samples
    pub lag_samples: i64,
    /// True only for a confident measurement that can be applied as offset
    pub valid: bool,
    /// Why the record is invalid, if it is a failure
    pub reason: Option<MeasurementError>,
    /// Searched lag range in ms when narrower than configured
    pub effective_max_lag_ms: Option<f64>,
    /// When the record was produced
    pub timestamp: DateTime<Local>,
    /// One-line summary
    pub display_text: String,
    /// Longer explanation
    pub notes_text: String,
}

impl MeasurementResult {
    /// Placeholder before the first measurement
    pub fn ready() -> Self {
        Self {
            delay_ms: 0.0,
            confidence: 0.0,
            lag_samples: 0,
            valid: false,
            reason: None,
            effective_max_lag_ms: None,
            timestamp: Local::now(),
            display_text: "Ready...".to_string(),
            notes_text: String::new(),
        }
    }

    /// Record for a confident measurement against `target_name`
    pub fn measured(measurement: &Measurement, target_name: Option<&str>) -> Self {
        let name = target_name.unwrap_or("<target>");
        let delay_ms = measurement.delay_ms;

        let mut notes_text = match measurement.direction() {
            Direction::Lags => format!("Target '{}' lags reference by {:.1} ms", name, delay_ms),
            Direction::Leads => format!(
                "Target '{}' leads reference by {:.1} ms",
                name,
                delay_ms.abs()
            ),
            Direction::Aligned => format!("Target '{}' is aligned with reference", name),
        };
        if let Some(range) = measurement.effective_max_lag_ms {
            notes_text.push_str(&format!(
                " (lag search limited to \u{b1}{:.1} ms by the analysis window)",
                range
            ));
        }

        Self {
            delay_ms,
            confidence: measurement.confidence,
            lag_samples: measurement.lag_samples,
            valid: true,
            reason: None,
            effective_max_lag_ms: measurement.effective_max_lag_ms,
            timestamp: Local::now(),
            display_text: format!(
                "{:+6.1} ms (correlation: {:.3})",
                delay_ms, measurement.confidence
            ),
            notes_text,
        }
    }

    /// Record for a failed measurement or offset application
    pub fn failed(error: MeasurementError) -> Self {
        let confidence = match &error {
            MeasurementError::LowConfidence {
                best_correlation: Some(c),
            } => *c,
            _ => 0.0,
        };

        Self {
            delay_ms: 0.0,
            confidence,
            lag_samples: 0,
            valid: false,
            display_text: error.to_string(),
            notes_text: error.notes(),
            reason: Some(error),
            effective_max_lag_ms: None,
            timestamp: Local::now(),
        }
    }

    /// Record after a delay was handed to the host as a sync offset
    ///
    /// Applying consumes the measurement, so the record is not `valid`.
    pub fn applied(delay_ms: f64) -> Self {
        Self {
            delay_ms,
            confidence: 0.0,
            lag_samples: 0,
            valid: false,
            reason: None,
            effective_max_lag_ms: None,
            timestamp: Local::now(),
            display_text: format!("Applied {:+.1} ms to Sync Offset", delay_ms),
            notes_text: "Sync Offset updated on reference source.".to_string(),
        }
    }

    /// Timestamp as `HH:MM:SS`
    pub fn time_text(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }

    /// Direction of a valid measurement
    pub fn direction(&self) -> Option<Direction> {
        self.valid.then(|| Direction::of(self.delay_ms))
    }
}

impl Default for MeasurementResult {
    fn default() -> Self {
        Self::ready()
    }
}
