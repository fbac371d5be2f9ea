//! Audio processing module
//!
//! This module contains the signal path of a measurement:
//! - Ring buffers accumulating both streams ([`ring`])
//! - Pre-emphasis and Hann windowing ([`conditioner`])
//! - Bounded-lag normalized cross-correlation ([`correlation`])
//! - Deterministic test signals for simulation and tests ([`signal`])

pub mod conditioner;
pub mod correlation;
pub mod ring;
pub mod signal;
