//! Circular sample storage for the reference and target streams
//!
//! Each stream keeps the most recent few seconds of audio in a fixed-size
//! buffer. Once a buffer is full every write evicts the oldest sample, so
//! writes never fail and never allocate. Both rings live inside a
//! [`RingAccumulator`], which the meter keeps behind its single lock; the
//! types in this module are plain single-threaded data structures.

use crate::audio::correlation::ms_to_samples;
use crate::meter::result::MeasurementError;

/// Minimum number of samples a snapshot must contain
pub const MIN_SNAPSHOT_FRAMES: usize = 1024;

/// Selects one of the two accumulated streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferId {
    /// The stream the filter is attached to
    Reference,
    /// The stream being compared against the reference
    Target,
}

/// Fixed-capacity circular buffer of f32 samples
///
/// Samples are stored in an owned arena indexed modulo the capacity.
/// The most recent `len()` samples are readable oldest-first starting at
/// `(write_position - len) mod capacity`.
#[derive(Debug, Clone)]
pub struct SampleRing {
    /// Sample storage, never resized after construction
    data: Vec<f32>,
    /// Next slot to write
    write_pos: usize,
    /// Number of valid samples, saturates at capacity
    count: usize,
}

impl SampleRing {
    /// Create an empty ring holding up to `capacity` samples
    ///
    /// A zero capacity is bumped to one so index arithmetic stays defined.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)],
            write_pos: 0,
            count: 0,
        }
    }

    /// Maximum number of samples retained
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid samples currently held
    pub fn len(&self) -> usize {
        self.count
    }

    /// True if nothing has been written since creation or the last clear
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True once the ring has wrapped at least once
    pub fn is_full(&self) -> bool {
        self.count == self.data.len()
    }

    /// Index of the slot the next sample will be written to
    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    /// Append samples in chronological order, evicting the oldest as needed
    pub fn write(&mut self, samples: &[f32]) {
        let capacity = self.data.len();

        // Only the newest `capacity` samples can survive this write
        let skip = samples.len().saturating_sub(capacity);
        self.write_pos = (self.write_pos + skip) % capacity;

        let mut remaining = &samples[skip..];
        while !remaining.is_empty() {
            let run = (capacity - self.write_pos).min(remaining.len());
            self.data[self.write_pos..self.write_pos + run].copy_from_slice(&remaining[..run]);
            self.write_pos = (self.write_pos + run) % capacity;
            remaining = &remaining[run..];
        }

        self.count = self.count.saturating_add(samples.len()).min(capacity);
    }

    /// Append samples from an iterator, one slot at a time
    ///
    /// Used for strided sources (e.g. one channel of an interleaved block)
    /// where no contiguous slice exists.
    pub fn extend<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = f32>,
    {
        let capacity = self.data.len();
        for sample in samples {
            self.data[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % capacity;
            if self.count < capacity {
                self.count += 1;
            }
        }
    }

    /// Copy the most recent `frames` samples, oldest first, onto `out`
    ///
    /// `frames` is clamped to `len()`. The circular layout is unwrapped so
    /// the copied run starts at index 0 of the appended region.
    pub fn copy_recent_into(&self, frames: usize, out: &mut Vec<f32>) {
        let frames = frames.min(self.count);
        let capacity = self.data.len();
        let start = (self.write_pos + capacity - frames) % capacity;
        let first = (capacity - start).min(frames);

        out.extend_from_slice(&self.data[start..start + first]);
        out.extend_from_slice(&self.data[..frames - first]);
    }

    /// The most recent `frames` samples as a new vector
    pub fn recent(&self, frames: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames.min(self.count));
        self.copy_recent_into(frames, &mut out);
        out
    }

    /// Forget all samples without releasing storage
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.count = 0;
    }
}

/// Linearized copy of the most recent audio of both streams
///
/// Both sequences have the same length and end at "now" in their
/// respective streams.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Reference stream samples, oldest first
    pub reference: Vec<f32>,
    /// Target stream samples, oldest first
    pub target: Vec<f32>,
}

impl Snapshot {
    /// Number of frames in each sequence
    pub fn frames(&self) -> usize {
        self.reference.len()
    }
}

/// Reference and target rings of identical capacity
#[derive(Debug, Clone)]
pub struct RingAccumulator {
    reference: SampleRing,
    target: SampleRing,
}

impl RingAccumulator {
    /// Create both rings with `capacity` samples each
    pub fn new(capacity: usize) -> Self {
        Self {
            reference: SampleRing::new(capacity),
            target: SampleRing::new(capacity),
        }
    }

    /// Create both rings sized for `seconds` of audio at `sample_rate`
    pub fn with_duration(seconds: u32, sample_rate: u32) -> Self {
        Self::new(ms_to_samples(seconds.saturating_mul(1000), sample_rate))
    }

    /// Capacity of each ring in samples
    pub fn capacity(&self) -> usize {
        self.reference.capacity()
    }

    /// Borrow one of the rings
    pub fn buffer(&self, id: BufferId) -> &SampleRing {
        match id {
            BufferId::Reference => &self.reference,
            BufferId::Target => &self.target,
        }
    }

    fn buffer_mut(&mut self, id: BufferId) -> &mut SampleRing {
        match id {
            BufferId::Reference => &mut self.reference,
            BufferId::Target => &mut self.target,
        }
    }

    /// Append samples to the named ring
    pub fn write(&mut self, id: BufferId, samples: &[f32]) {
        self.buffer_mut(id).write(samples);
    }

    /// Append samples from an iterator to the named ring
    pub fn extend<I>(&mut self, id: BufferId, samples: I)
    where
        I: IntoIterator<Item = f32>,
    {
        self.buffer_mut(id).extend(samples);
    }

    /// Samples available in both rings
    pub fn available(&self) -> usize {
        self.reference.len().min(self.target.len())
    }

    /// Copy the most recent `frames_requested` samples of both rings
    ///
    /// The snapshot length is `min(frames_requested, reference.len(), target.len())`,
    /// taken the same number of frames back from the newest sample of each ring.
    ///
    /// # Errors
    /// - [`MeasurementError::InsufficientData`] if fewer than
    ///   [`MIN_SNAPSHOT_FRAMES`] samples would be copied
    /// - [`MeasurementError::AllocationFailure`] if the copies cannot be allocated
    pub fn snapshot(&self, frames_requested: usize) -> Result<Snapshot, MeasurementError> {
        let frames = frames_requested.min(self.available());
        if frames < MIN_SNAPSHOT_FRAMES {
            return Err(MeasurementError::InsufficientData {
                available: frames,
                required: MIN_SNAPSHOT_FRAMES,
            });
        }

        let mut reference = allocate(frames)?;
        let mut target = allocate(frames)?;
        self.reference.copy_recent_into(frames, &mut reference);
        self.target.copy_recent_into(frames, &mut target);

        Ok(Snapshot { reference, target })
    }

    /// Empty one ring, leaving the other untouched
    pub fn clear(&mut self, id: BufferId) {
        self.buffer_mut(id).clear();
    }

    /// Empty both rings
    pub fn clear_all(&mut self) {
        self.reference.clear();
        self.target.clear();
    }
}

fn allocate(frames: usize) -> Result<Vec<f32>, MeasurementError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(frames)
        .map_err(|_| MeasurementError::AllocationFailure { frames })?;
    Ok(buf)
}
