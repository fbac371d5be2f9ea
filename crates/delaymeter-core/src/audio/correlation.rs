//! Bounded-lag normalized cross-correlation
//!
//! Finds the integer lag that maximizes the Pearson correlation between a
//! reference and a target snapshot. The search is direct (not FFT based):
//! every lag in `[-max_lag, +max_lag]` is evaluated over its overlap, so the
//! cost is `O(max_lag * frames)` and fully determined by configuration.
//!
//! ## Lag convention
//!
//! ```text
//! lag >= 0: reference[0..overlap]     vs target[lag..lag + overlap]
//! lag <  0: reference[|lag|..]        vs target[0..overlap]
//! ```
//!
//! A positive lag means the target has to be advanced to line up with the
//! reference, i.e. the target lags in real time.

use crate::audio::ring::MIN_SNAPSHOT_FRAMES;
use crate::meter::result::MeasurementError;

/// Minimum overlap for a lag to be evaluated
pub const MIN_OVERLAP: usize = MIN_SNAPSHOT_FRAMES;

/// Correlation a lag must reach to count as a confident measurement
pub const MIN_CORRELATION: f64 = 0.6;

/// Below this the correlation denominator is treated as silence
const MIN_DENOMINATOR: f64 = 1e-8;

/// Convert milliseconds to samples, rounding half up
///
/// Computed as `(ms * sample_rate + 500) / 1000` in integer arithmetic.
pub fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    ((ms as u64 * sample_rate as u64 + 500) / 1000) as usize
}

/// Convert a signed sample count to milliseconds
pub fn samples_to_ms(samples: i64, sample_rate: u32) -> f64 {
    samples as f64 * 1000.0 / sample_rate as f64
}

/// Outcome of a lag search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagEstimate {
    /// Lag with the highest correlation
    pub best_lag: i64,
    /// Pearson correlation at `best_lag`
    pub best_corr: f64,
    /// Number of lags that produced a defined correlation
    pub lag_count: usize,
    /// Maximum lag actually searched after clamping to `frames / 2`
    pub max_lag: usize,
    /// Maximum lag the caller asked for
    pub requested_max_lag: usize,
    /// Frames compared
    pub frames: usize,
}

impl LagEstimate {
    /// True when the searched range is narrower than requested
    pub fn is_range_reduced(&self) -> bool {
        self.max_lag < self.requested_max_lag
    }

    /// True when the correlation clears [`MIN_CORRELATION`]
    pub fn is_confident(&self) -> bool {
        self.best_corr >= MIN_CORRELATION
    }
}

/// Scan every lag and return the best one, without applying the threshold
///
/// Returns `None` for `best_lag`/`best_corr` when no lag produced a defined
/// correlation (silent or constant input, or too few frames).
pub fn scan_lags(
    reference: &[f32],
    target: &[f32],
    max_lag_samples: usize,
) -> (Option<(i64, f64)>, usize, usize) {
    let frames = reference.len().min(target.len());
    let reference = &reference[..frames];
    let target = &target[..frames];
    let max_lag = max_lag_samples.min(frames / 2);

    if frames == 0 {
        return (None, 0, max_lag);
    }

    let ref_mean = mean(reference);
    let tgt_mean = mean(target);

    let mut best: Option<(i64, f64)> = None;
    let mut lag_count = 0;
    let max_lag_signed = max_lag as i64;

    for lag in -max_lag_signed..=max_lag_signed {
        let abs_lag = lag.unsigned_abs() as usize;
        let overlap = frames - abs_lag;
        if overlap < MIN_OVERLAP {
            continue;
        }

        let (a, b) = if lag >= 0 {
            (&reference[..overlap], &target[abs_lag..abs_lag + overlap])
        } else {
            (&reference[abs_lag..abs_lag + overlap], &target[..overlap])
        };

        let Some(corr) = pearson(a, b, ref_mean, tgt_mean) else {
            continue;
        };
        lag_count += 1;

        // Strict comparison keeps the earliest lag on ties
        if best.map_or(true, |(_, best_corr)| corr > best_corr) {
            best = Some((lag, corr));
        }
    }

    (best, lag_count, max_lag)
}

/// Find the lag maximizing the correlation between two snapshots
///
/// Only the first `min(reference.len(), target.len())` frames are used.
/// `max_lag_samples` is clamped to `frames / 2`; lags leaving fewer than
/// [`MIN_OVERLAP`] overlapping samples are skipped.
///
/// # Errors
/// - [`MeasurementError::InsufficientData`] for fewer than [`MIN_OVERLAP`] frames
/// - [`MeasurementError::LowConfidence`] when the best correlation is below
///   [`MIN_CORRELATION`] or no lag produced a defined correlation
///
/// # Example
/// ```
/// use delaymeter_core::audio::correlation::find_best_lag;
/// use delaymeter_core::audio::signal::{delayed, NoiseGenerator};
///
/// let reference = NoiseGenerator::new(7).generate(4096);
/// let target = delayed(&reference, 25);
///
/// let estimate = find_best_lag(&reference, &target, 200).unwrap();
/// assert_eq!(estimate.best_lag, 25);
/// assert!(estimate.best_corr > 0.99);
/// ```
pub fn find_best_lag(
    reference: &[f32],
    target: &[f32],
    max_lag_samples: usize,
) -> Result<LagEstimate, MeasurementError> {
    let frames = reference.len().min(target.len());
    if frames < MIN_OVERLAP {
        return Err(MeasurementError::InsufficientData {
            available: frames,
            required: MIN_OVERLAP,
        });
    }

    let (best, lag_count, max_lag) = scan_lags(reference, target, max_lag_samples);

    let Some((best_lag, best_corr)) = best else {
        return Err(MeasurementError::LowConfidence {
            best_correlation: None,
        });
    };

    let estimate = LagEstimate {
        best_lag,
        best_corr,
        lag_count,
        max_lag,
        requested_max_lag: max_lag_samples,
        frames,
    };

    if !estimate.is_confident() {
        return Err(MeasurementError::LowConfidence {
            best_correlation: Some(best_corr),
        });
    }

    Ok(estimate)
}

fn mean(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64
}

/// Mean-centered Pearson correlation using precomputed global means
fn pearson(a: &[f32], b: &[f32], a_mean: f64, b_mean: f64) -> Option<f64> {
    let mut sum_ab = 0.0f64;
    let mut sum_a2 = 0.0f64;
    let mut sum_b2 = 0.0f64;

    for (&x, &y) in a.iter().zip(b) {
        let da = x as f64 - a_mean;
        let db = y as f64 - b_mean;
        sum_ab += da * db;
        sum_a2 += da * da;
        sum_b2 += db * db;
    }

    let denom = (sum_a2 * sum_b2).sqrt();
    if denom < MIN_DENOMINATOR {
        return None;
    }
    Some(sum_ab / denom)
}
