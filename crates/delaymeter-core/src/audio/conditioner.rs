//! Signal conditioning applied to snapshots before correlation
//!
//! A first-order pre-emphasis filter removes DC and slow low-frequency
//! content that would otherwise dominate the correlation sum, then a Hann
//! window tapers both ends of the snapshot. Both stages run in place on an
//! owned copy, in that fixed order.

use crate::audio::ring::Snapshot;
use std::f64::consts::PI;

/// Pre-emphasis coefficient
pub const PRE_EMPHASIS_ALPHA: f32 = 0.95;

/// Apply `y[i] = x[i] - alpha * x[i - 1]` in place
///
/// The previous *input* sample is used, not the filtered one. `y[0] = x[0]`.
/// Does nothing for fewer than 2 samples.
pub fn pre_emphasize(samples: &mut [f32]) {
    if samples.len() < 2 {
        return;
    }

    let mut prev = samples[0];
    for sample in samples.iter_mut().skip(1) {
        let current = *sample;
        *sample = current - PRE_EMPHASIS_ALPHA * prev;
        prev = current;
    }
}

/// Hann window weight for index `i` of `n`
pub fn hann_weight(i: usize, n: usize) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    0.5 * (1.0 - (2.0 * PI * i as f64 / (n - 1) as f64).cos())
}

/// Multiply each sample by its Hann window weight in place
///
/// Does nothing for one sample or fewer.
pub fn apply_hann_window(samples: &mut [f32]) {
    let n = samples.len();
    if n <= 1 {
        return;
    }

    for (i, sample) in samples.iter_mut().enumerate() {
        *sample *= hann_weight(i, n) as f32;
    }
}

/// Pre-emphasis followed by windowing
pub fn condition(samples: &mut [f32]) {
    pre_emphasize(samples);
    apply_hann_window(samples);
}

/// Condition both halves of a snapshot independently
pub fn condition_snapshot(snapshot: &mut Snapshot) {
    condition(&mut snapshot.reference);
    condition(&mut snapshot.target);
}
