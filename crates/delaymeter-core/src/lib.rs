//! Delaymeter Core - Delay estimation engine for two live audio streams
//!
//! This library measures how far a "target" audio stream lags or leads a
//! "reference" stream carrying the same program audio. Both streams are
//! accumulated into ring buffers, a recent window is conditioned
//! (pre-emphasis + Hann window) and a bounded-lag normalized
//! cross-correlation search reports the delay in milliseconds together
//! with the Pearson correlation at the chosen lag.

pub mod audio;
pub mod meter;

pub use audio::correlation::{find_best_lag, ms_to_samples, samples_to_ms, LagEstimate};
pub use audio::ring::{BufferId, RingAccumulator, SampleRing, Snapshot};
pub use meter::config::{ConfigError, EngineConfig};
pub use meter::engine::{DelayMeter, MeterState, TargetSink};
pub use meter::result::{Direction, Measurement, MeasurementError, MeasurementResult};
pub use meter::source::{AudioBlock, SourceRegistry, StreamSource, SyncOffsetTarget};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sample rate when the host does not specify one
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Seconds of audio retained per stream
pub const BUFFER_SECONDS: u32 = 5;
