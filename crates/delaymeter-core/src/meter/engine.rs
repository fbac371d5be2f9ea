//! Delay meter: thread-safe facade over the measurement pipeline
//!
//! Provides the operations a host integration needs:
//! - Feeding reference and target audio from independent callback threads
//! - Binding the target to a named external stream
//! - Running on-demand measurements and applying their result as an offset
//!
//! ## Concurrency
//!
//! Both ring buffers, the configuration and the current result live behind
//! one mutex. It is held only for linear-time work (appending a block,
//! copying a snapshot, swapping the result record). Conditioning and the
//! `O(lag * frames)` correlation search run on private copies with the lock
//! released, so audio producers are never stalled by a measurement.
//!
//! ```text
//! reference cb ──write_reference──┐
//!                                 ├──> [ rings | config | result ]  (one lock)
//! target cb ─────TargetSink.write─┘               │ snapshot
//!                                                 v
//! control thread ──measure()──> condition ──> find_best_lag ──> result ──> subscribers
//! ```

use crate::audio::conditioner::condition_snapshot;
use crate::audio::correlation::{find_best_lag, samples_to_ms, MIN_CORRELATION};
use crate::audio::ring::{BufferId, RingAccumulator};
use crate::meter::config::{ConfigError, EngineConfig};
use crate::meter::notify::ResultNotifier;
use crate::meter::result::{Measurement, MeasurementError, MeasurementResult};
use crate::meter::source::{
    sync_offset_ns, AudioBlock, SourceRegistry, StreamSource, SyncOffsetTarget,
};
use crossbeam_channel::Receiver;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Whether a measurement is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterState {
    /// Holding a result (possibly the initial placeholder)
    Idle,
    /// A measurement is in progress
    Measuring,
}

/// Everything guarded by the engine lock
struct MeterInner {
    buffers: RingAccumulator,
    config: EngineConfig,
    last_result: MeasurementResult,
    /// Delay of the last valid measurement that has not been applied
    pending_delay_ms: Option<f64>,
    /// Bumped on every target rebinding so stale sinks stop writing
    target_generation: u64,
}

impl MeterInner {
    fn append(&mut self, id: BufferId, samples: &[f32]) {
        if !samples.is_empty() {
            self.buffers.write(id, samples);
        }
    }

    fn append_block(&mut self, id: BufferId, block: AudioBlock<'_>) {
        match block.first_channel_slice() {
            Some(samples) => self.append(id, samples),
            None => self.buffers.extend(id, block.first_channel()),
        }
    }
}

/// State shared between the meter and the sinks handed to sources
struct MeterShared {
    inner: Mutex<MeterInner>,
}

impl MeterShared {
    fn lock(&self) -> MutexGuard<'_, MeterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for a write from the sink of `generation`; `None` once stale
    ///
    /// The generation is checked under the same lock that guards the write,
    /// so a rebinding can never interleave between check and append.
    fn lock_target(&self, generation: u64) -> Option<MutexGuard<'_, MeterInner>> {
        let inner = self.lock();
        (inner.target_generation == generation).then_some(inner)
    }
}

/// Handle through which a [`StreamSource`] feeds the target buffer
///
/// Handed out by [`DelayMeter::connect_target`]. Writes are dropped once the
/// meter is gone or the target has been rebound to another source.
#[derive(Clone)]
pub struct TargetSink {
    shared: Weak<MeterShared>,
    generation: u64,
}

impl TargetSink {
    /// Append samples to the target buffer; false if the sink is stale
    pub fn write(&self, samples: &[f32]) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let Some(mut inner) = shared.lock_target(self.generation) else {
            return false;
        };
        inner.append(BufferId::Target, samples);
        true
    }

    /// Append the first channel of a block to the target buffer
    pub fn write_block(&self, block: AudioBlock<'_>) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let Some(mut inner) = shared.lock_target(self.generation) else {
            return false;
        };
        inner.append_block(BufferId::Target, block);
        true
    }

    /// True while this sink still feeds the meter's target
    pub fn is_current(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => {
                let current = shared.lock_target(self.generation).is_some();
                current
            }
            None => false,
        }
    }
}

impl fmt::Debug for TargetSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetSink")
            .field("generation", &self.generation)
            .field("current", &self.is_current())
            .finish()
    }
}

/// What the target currently refers to
enum TargetBinding {
    Unbound,
    /// Bound by name only; the host writes with [`DelayMeter::write_target`]
    Named(String),
    /// Name not resolvable yet, retried as reference audio arrives
    Pending(String),
    /// Resolved through the registry and forwarding into a sink
    Attached {
        name: String,
        source: Arc<dyn StreamSource>,
    },
}

impl TargetBinding {
    fn name(&self) -> Option<&str> {
        match self {
            TargetBinding::Unbound => None,
            TargetBinding::Named(name) | TargetBinding::Pending(name) => Some(name),
            TargetBinding::Attached { name, .. } => Some(name),
        }
    }

    fn is_bound(&self) -> bool {
        matches!(
            self,
            TargetBinding::Named(_) | TargetBinding::Attached { .. }
        )
    }
}

/// Decrements the in-flight measurement count when dropped
struct MeasuringGuard<'a>(&'a AtomicUsize);

impl Drop for MeasuringGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Measures the delay between a reference and a target audio stream
///
/// # Example
/// ```
/// use delaymeter_core::audio::signal::{delayed, program_audio};
/// use delaymeter_core::{DelayMeter, EngineConfig};
///
/// let config = EngineConfig::new(8000).with_max_lag_ms(100);
/// let meter = DelayMeter::new(config).unwrap();
/// meter.connect_target("Camera 2");
///
/// let reference = program_audio(1, 8000, 12000);
/// let target = delayed(&reference, 80); // 10ms late
/// meter.write_reference(&reference);
/// meter.write_target(&target);
///
/// let result = meter.measure();
/// assert!(result.valid);
/// assert!((result.delay_ms - 10.0).abs() < 1e-9);
/// ```
pub struct DelayMeter {
    sample_rate: u32,
    shared: Arc<MeterShared>,
    binding: Mutex<TargetBinding>,
    /// Fast-path flag so audio callbacks skip the binding lock
    target_pending: AtomicBool,
    registry: Option<Arc<dyn SourceRegistry>>,
    notifier: ResultNotifier,
    in_flight: AtomicUsize,
}

impl DelayMeter {
    /// Create a meter; the sample rate is fixed for its lifetime
    ///
    /// Window and lag settings are clamped into their bounds.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = config.clamped();
        let buffers = RingAccumulator::new(config.buffer_capacity());

        tracing::info!(
            sample_rate = config.sample_rate,
            capacity = buffers.capacity(),
            window_ms = config.analysis_window_ms,
            max_lag_ms = config.max_lag_search_ms,
            "Delay meter created"
        );

        Ok(Self {
            sample_rate: config.sample_rate,
            shared: Arc::new(MeterShared {
                inner: Mutex::new(MeterInner {
                    buffers,
                    config,
                    last_result: MeasurementResult::ready(),
                    pending_delay_ms: None,
                    target_generation: 0,
                }),
            }),
            binding: Mutex::new(TargetBinding::Unbound),
            target_pending: AtomicBool::new(false),
            registry: None,
            notifier: ResultNotifier::new(),
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Resolve target names through a host registry
    ///
    /// Without a registry, [`Self::connect_target`] only records the name and
    /// the host feeds target audio with [`Self::write_target`].
    pub fn with_registry(mut self, registry: Arc<dyn SourceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sample rate of both streams
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current configuration
    pub fn config(&self) -> EngineConfig {
        self.shared.lock().config
    }

    /// Update the tunables; values are clamped into their bounds
    ///
    /// Safe to call while audio is being written. Takes effect on the next
    /// measurement.
    pub fn configure(&self, analysis_window_ms: u32, max_lag_search_ms: u32, debug_enabled: bool) {
        let mut inner = self.shared.lock();
        let updated = inner
            .config
            .with_window_ms(analysis_window_ms)
            .with_max_lag_ms(max_lag_search_ms)
            .with_debug(debug_enabled);

        if updated != inner.config {
            tracing::info!(
                window_ms = updated.analysis_window_ms,
                max_lag_ms = updated.max_lag_search_ms,
                debug = updated.debug_enabled,
                "Meter configuration updated"
            );
            inner.config = updated;
        }
    }

    /// Feed reference audio (single channel, engine sample rate)
    pub fn write_reference(&self, samples: &[f32]) {
        self.retry_pending_target();
        if !samples.is_empty() {
            self.shared.lock().append(BufferId::Reference, samples);
        }
    }

    /// Feed the first channel of a reference block
    pub fn write_reference_block(&self, block: AudioBlock<'_>) {
        self.retry_pending_target();
        self.shared.lock().append_block(BufferId::Reference, block);
    }

    /// Feed target audio directly (single channel, engine sample rate)
    pub fn write_target(&self, samples: &[f32]) {
        if !samples.is_empty() {
            self.shared.lock().append(BufferId::Target, samples);
        }
    }

    /// Feed the first channel of a target block directly
    pub fn write_target_block(&self, block: AudioBlock<'_>) {
        self.shared.lock().append_block(BufferId::Target, block);
    }

    /// Samples currently held as `(reference, target)`
    pub fn buffered(&self) -> (usize, usize) {
        let inner = self.shared.lock();
        (
            inner.buffers.buffer(BufferId::Reference).len(),
            inner.buffers.buffer(BufferId::Target).len(),
        )
    }

    /// Drop all buffered audio of both streams
    pub fn clear_buffers(&self) {
        self.shared.lock().buffers.clear_all();
    }

    /// Bind the target to the stream named `id`
    ///
    /// Rebinding to the name already bound is a no-op. Otherwise the prior
    /// source is disconnected and the target buffer emptied. An empty `id`
    /// unbinds.
    pub fn connect_target(&self, id: &str) {
        let mut binding = self.lock_binding();
        if !id.is_empty() && binding.is_bound() && binding.name() == Some(id) {
            return;
        }

        self.release(&mut binding);

        if id.is_empty() {
            self.target_pending.store(false, Ordering::Release);
            return;
        }

        tracing::info!(stream = id, "Connecting to target");
        *binding = self.resolve(id, true);
        self.target_pending.store(
            matches!(*binding, TargetBinding::Pending(_)),
            Ordering::Release,
        );
    }

    /// Unbind the target
    pub fn disconnect_target(&self) {
        self.connect_target("");
    }

    /// Name of the bound (or pending) target
    pub fn target_name(&self) -> Option<String> {
        self.lock_binding().name().map(str::to_string)
    }

    /// True if a target is bound and resolvable
    pub fn has_target(&self) -> bool {
        self.lock_binding().is_bound()
    }

    /// Receive a copy of every future result
    pub fn subscribe(&self) -> Receiver<MeasurementResult> {
        self.notifier.subscribe()
    }

    /// Whether a measurement is running
    pub fn state(&self) -> MeterState {
        if self.in_flight.load(Ordering::Acquire) > 0 {
            MeterState::Measuring
        } else {
            MeterState::Idle
        }
    }

    /// Copy of the current result record
    pub fn last_result(&self) -> MeasurementResult {
        self.shared.lock().last_result.clone()
    }

    /// Delay of the last valid measurement not yet applied as offset
    pub fn last_valid_delay_ms(&self) -> Option<f64> {
        self.shared.lock().pending_delay_ms
    }

    /// Run one measurement and record its result
    ///
    /// Never fails: problems are reported as an invalid result with a
    /// reason. Runs synchronously; its cost is bounded by
    /// `window_frames * max_lag_samples`.
    pub fn measure(&self) -> MeasurementResult {
        self.measure_and_record().1
    }

    /// Run one measurement, record its result and return the typed outcome
    pub fn try_measure(&self) -> Result<Measurement, MeasurementError> {
        self.measure_and_record().0
    }

    /// Hand the last valid delay to the host as a sync offset
    ///
    /// The offset is `round(delay_ms * 1_000_000)` nanoseconds. A successful
    /// application consumes the measurement.
    pub fn apply_as_offset(&self, parent: Option<&dyn SyncOffsetTarget>) -> MeasurementResult {
        let outcome = self.apply_offset(parent);
        let result = match &outcome {
            Ok(delay_ms) => MeasurementResult::applied(*delay_ms),
            Err(e) => {
                tracing::info!(reason = %e, "Sync offset not applied");
                MeasurementResult::failed(e.clone())
            }
        };

        self.store_result(&result, |pending| {
            if let Ok(applied) = outcome {
                if *pending == Some(applied) {
                    *pending = None;
                }
            }
        });
        result
    }

    fn apply_offset(&self, parent: Option<&dyn SyncOffsetTarget>) -> Result<f64, MeasurementError> {
        let delay_ms = self
            .last_valid_delay_ms()
            .ok_or(MeasurementError::NoRecentMeasurement)?;
        let parent = parent.ok_or(MeasurementError::NoParentSource)?;

        let offset_ns = sync_offset_ns(delay_ms);
        if !parent.set_sync_offset(offset_ns) {
            return Err(MeasurementError::ParentUnavailable);
        }

        tracing::info!(delay_ms, offset_ns, "Applied sync offset");
        Ok(delay_ms)
    }

    fn measure_and_record(&self) -> (Result<Measurement, MeasurementError>, MeasurementResult) {
        if self.in_flight.fetch_add(1, Ordering::AcqRel) > 0 {
            tracing::warn!("Measurement requested while another is in progress");
        }
        let _guard = MeasuringGuard(&self.in_flight);

        let target_name = self.target_name();
        let outcome = self.run_measurement();

        let result = match &outcome {
            Ok(measurement) => {
                let result = MeasurementResult::measured(measurement, target_name.as_deref());
                tracing::info!(result = %result.display_text, "Measurement complete");
                result
            }
            Err(e) => MeasurementResult::failed(e.clone()),
        };

        let delay = outcome.as_ref().ok().map(|m| m.delay_ms);
        self.store_result(&result, |pending| *pending = delay);
        (outcome, result)
    }

    fn run_measurement(&self) -> Result<Measurement, MeasurementError> {
        if !self.has_target() {
            return Err(MeasurementError::NoTarget);
        }

        let (mut snapshot, config) = {
            let inner = self.shared.lock();
            let config = inner.config;
            if config.debug_enabled {
                tracing::info!(
                    reference_len = inner.buffers.buffer(BufferId::Reference).len(),
                    target_len = inner.buffers.buffer(BufferId::Target).len(),
                    "Starting measurement"
                );
            }
            (inner.buffers.snapshot(config.window_frames())?, config)
        };

        tracing::info!(frames = snapshot.frames(), "Estimating audio delay");
        condition_snapshot(&mut snapshot);

        let requested = config.max_lag_samples();
        let effective = requested.min(snapshot.frames() / 2);
        let effective_max_lag_ms = if effective < requested {
            let ms = samples_to_ms(effective as i64, self.sample_rate);
            tracing::warn!(
                configured_ms = config.max_lag_search_ms,
                effective_ms = %format!("{:.1}", ms),
                frames = snapshot.frames(),
                "Effective max lag reduced by analysis window"
            );
            Some(ms)
        } else {
            None
        };

        if config.debug_enabled {
            let mean = |s: &[f32]| s.iter().map(|&x| x as f64).sum::<f64>() / s.len().max(1) as f64;
            tracing::info!(
                frames = snapshot.frames(),
                max_lag = effective,
                ref_mean = %format!("{:.6}", mean(&snapshot.reference[..])),
                tgt_mean = %format!("{:.6}", mean(&snapshot.target[..])),
                "Correlation search"
            );
        }

        let estimate = match find_best_lag(&snapshot.reference, &snapshot.target, requested) {
            Ok(estimate) => estimate,
            Err(e) => {
                if let MeasurementError::LowConfidence { best_correlation } = &e {
                    tracing::info!(
                        best_correlation = ?best_correlation,
                        threshold = MIN_CORRELATION,
                        "Correlation too low"
                    );
                }
                return Err(e);
            }
        };

        if config.debug_enabled {
            tracing::info!(
                best_corr = %format!("{:.4}", estimate.best_corr),
                best_lag = estimate.best_lag,
                lag_count = estimate.lag_count,
                "Correlation search finished"
            );
        }

        Ok(Measurement {
            delay_ms: samples_to_ms(estimate.best_lag, self.sample_rate),
            lag_samples: estimate.best_lag,
            confidence: estimate.best_corr,
            frames: estimate.frames,
            lag_count: estimate.lag_count,
            effective_max_lag_ms,
        })
    }

    /// Swap in a new result record and notify subscribers
    fn store_result<F>(&self, result: &MeasurementResult, update_pending: F)
    where
        F: FnOnce(&mut Option<f64>),
    {
        {
            let mut inner = self.shared.lock();
            inner.last_result = result.clone();
            update_pending(&mut inner.pending_delay_ms);
        }
        self.notifier.publish(result);
    }

    fn lock_binding(&self) -> MutexGuard<'_, TargetBinding> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the current binding, its sink and its buffered audio
    fn release(&self, binding: &mut TargetBinding) {
        match binding {
            TargetBinding::Unbound => return,
            TargetBinding::Attached { source, .. } => {
                tracing::info!(stream = source.id(), "Releasing prior target");
                source.disconnect();
            }
            TargetBinding::Named(name) | TargetBinding::Pending(name) => {
                tracing::info!(stream = %name, "Unbinding prior target");
            }
        }

        {
            let mut inner = self.shared.lock();
            inner.target_generation += 1;
            inner.buffers.clear(BufferId::Target);
        }
        *binding = TargetBinding::Unbound;
    }

    fn resolve(&self, id: &str, log_missing: bool) -> TargetBinding {
        let Some(registry) = &self.registry else {
            return TargetBinding::Named(id.to_string());
        };

        let Some(source) = registry.lookup(id) else {
            if log_missing {
                tracing::info!(stream = id, "Target not yet available");
            }
            return TargetBinding::Pending(id.to_string());
        };

        let sink = TargetSink {
            shared: Arc::downgrade(&self.shared),
            generation: self.shared.lock().target_generation,
        };
        if source.connect(sink) {
            tracing::info!(stream = source.id(), "Target attached");
            TargetBinding::Attached {
                name: id.to_string(),
                source,
            }
        } else {
            if log_missing {
                tracing::warn!(stream = id, "Target refused connection");
            }
            TargetBinding::Pending(id.to_string())
        }
    }

    /// Quietly retry resolving a pending target from the audio path
    fn retry_pending_target(&self) {
        if !self.target_pending.load(Ordering::Acquire) {
            return;
        }
        // Never wait on the binding lock from an audio callback
        let Ok(mut binding) = self.binding.try_lock() else {
            return;
        };
        let TargetBinding::Pending(name) = &*binding else {
            return;
        };

        let name = name.clone();
        let resolved = self.resolve(&name, false);
        if resolved.is_bound() {
            tracing::info!(stream = %name, "Target became available");
            *binding = resolved;
            self.target_pending.store(false, Ordering::Release);
        }
    }
}

impl Drop for DelayMeter {
    fn drop(&mut self) {
        let binding = self.binding.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let TargetBinding::Attached { source, .. } = binding {
            source.disconnect();
        }
    }
}
