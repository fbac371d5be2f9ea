//! Deterministic test signals
//!
//! Program-like audio for simulations, benches and tests. Everything here
//! is seeded so runs are reproducible.

use std::f32::consts::PI;

/// Fallback seed, xorshift state must never be zero
const DEFAULT_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// White noise generator (xorshift64*)
///
/// # Example
/// ```
/// use delaymeter_core::audio::signal::NoiseGenerator;
///
/// let mut gen = NoiseGenerator::new(42);
/// let sample = gen.next_sample();
/// assert!(sample.abs() <= 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    state: u64,
    amplitude: f32,
}

impl NoiseGenerator {
    /// Create a generator with the given seed and 0.5 peak amplitude
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { DEFAULT_SEED } else { seed },
            amplitude: 0.5, // -6dB to leave headroom
        }
    }

    /// Set the peak amplitude (clamped to 0.0..=1.0)
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Peak amplitude
    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    /// Next sample, uniform in `[-amplitude, amplitude)`
    pub fn next_sample(&mut self) -> f32 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        let bits = self.state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 40;
        let unit = bits as f32 / (1u64 << 24) as f32;
        (unit * 2.0 - 1.0) * self.amplitude
    }

    /// Fill a buffer with noise
    pub fn fill_buffer(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample();
        }
    }

    /// Generate `len` samples
    pub fn generate(&mut self, len: usize) -> Vec<f32> {
        let mut out = vec![0.0; len];
        self.fill_buffer(&mut out);
        out
    }
}

/// Pure sine of `frequency` Hz
pub fn sine(frequency: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    let step = 2.0 * PI * frequency / sample_rate as f32;
    (0..len)
        .map(|i| amplitude * (step * i as f32).sin())
        .collect()
}

/// Program-like audio: noise with a low hum and a tone on top
///
/// The hum gives pre-emphasis something to remove; the noise carries the
/// transients correlation locks onto.
pub fn program_audio(seed: u64, sample_rate: u32, len: usize) -> Vec<f32> {
    let mut noise = NoiseGenerator::new(seed).with_amplitude(0.3);
    let hum = sine(50.0, sample_rate, len, 0.2);
    let tone = sine(440.0, sample_rate, len, 0.1);
    hum.iter()
        .zip(tone.iter())
        .map(|(h, t)| h + t + noise.next_sample())
        .collect()
}

/// Copy of `signal` shifted by `shift` samples, same length
///
/// `out[i] = signal[i - shift]`, zero where that index falls outside the
/// input. A positive shift delays the signal.
pub fn delayed(signal: &[f32], shift: i64) -> Vec<f32> {
    let len = signal.len() as i64;
    (0..len)
        .map(|i| {
            match i.checked_sub(shift) {
                Some(src) if (0..len).contains(&src) => signal[src as usize],
                _ => 0.0,
            }
        })
        .collect()
}
