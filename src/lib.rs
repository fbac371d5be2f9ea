//! Delaymeter - measure the delay between two live audio streams
//!
//! This library re-exports the delay estimation engine from
//! `delaymeter-core` and adds the persisted application settings used by
//! the command line tool.

pub mod config;

pub use delaymeter_core::audio;
pub use delaymeter_core::meter;

pub use config::AppConfig;
pub use delaymeter_core::{
    AudioBlock, DelayMeter, Direction, EngineConfig, Measurement, MeasurementError,
    MeasurementResult, MeterState, SourceRegistry, StreamSource, SyncOffsetTarget, TargetSink,
};
pub use delaymeter_core::{DEFAULT_SAMPLE_RATE, VERSION};
