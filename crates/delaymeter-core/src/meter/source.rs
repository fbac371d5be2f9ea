//! Host boundary
//!
//! The engine never reaches into host objects. A host exposes its audio
//! streams as [`StreamSource`]s (found through a [`SourceRegistry`]), feeds
//! them into the engine through a [`crate::TargetSink`], and applies measured
//! delays through a [`SyncOffsetTarget`].

use crate::meter::engine::TargetSink;
use std::sync::Arc;

/// An external audio stream that can feed the target buffer
///
/// Implementations register a capture callback on `connect` that forwards
/// each block to [`TargetSink::write`] (or [`TargetSink::write_block`]), and
/// remove it again on `disconnect`.
pub trait StreamSource: Send + Sync {
    /// Name the operator selected this stream by
    fn id(&self) -> &str;

    /// Start forwarding audio into `sink`; false if the stream refused
    fn connect(&self, sink: TargetSink) -> bool;

    /// Stop forwarding audio
    fn disconnect(&self);
}

/// Resolves stream names to sources
pub trait SourceRegistry: Send + Sync {
    /// Find a source by name, `None` if it does not exist (yet)
    fn lookup(&self, id: &str) -> Option<Arc<dyn StreamSource>>;
}

/// Component whose playback offset can be adjusted by the host
pub trait SyncOffsetTarget {
    /// Set the offset in nanoseconds; false if the component went away
    fn set_sync_offset(&self, offset_ns: i64) -> bool;
}

/// Convert a delay in milliseconds to a sync offset in nanoseconds
pub fn sync_offset_ns(delay_ms: f64) -> i64 {
    (delay_ms * 1_000_000.0).round() as i64
}

/// A block of float audio as delivered by a host callback
///
/// Only the first channel is accumulated.
#[derive(Debug, Clone, Copy)]
pub enum AudioBlock<'a> {
    /// One slice per channel
    Planar(&'a [&'a [f32]]),
    /// Frames of `channels` interleaved samples
    Interleaved { samples: &'a [f32], channels: usize },
}

impl<'a> AudioBlock<'a> {
    /// Number of frames in the block
    pub fn frames(&self) -> usize {
        match self {
            AudioBlock::Planar(planes) => planes.first().map_or(0, |p| p.len()),
            AudioBlock::Interleaved { samples, channels } => {
                if *channels == 0 {
                    0
                } else {
                    samples.len() / channels
                }
            }
        }
    }

    /// Contiguous first channel, if the layout has one
    pub fn first_channel_slice(&self) -> Option<&'a [f32]> {
        match *self {
            AudioBlock::Planar(planes) => planes.first().copied(),
            AudioBlock::Interleaved {
                samples,
                channels: 1,
            } => Some(samples),
            AudioBlock::Interleaved { .. } => None,
        }
    }

    /// Samples of the first channel in order
    pub fn first_channel(&self) -> impl Iterator<Item = f32> + 'a {
        let (samples, stride): (&'a [f32], usize) = match *self {
            AudioBlock::Planar(planes) => (planes.first().copied().unwrap_or(&[]), 1),
            AudioBlock::Interleaved { channels: 0, .. } => (&[], 1),
            AudioBlock::Interleaved { samples, channels } => {
                (&samples[..samples.len() - samples.len() % channels], channels)
            }
        };
        samples.iter().step_by(stride).copied()
    }
}
