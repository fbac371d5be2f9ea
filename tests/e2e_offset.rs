//! E2E tests for host integration
//!
//! Covers target resolution through a source registry, the sink handed to
//! a source, and applying a measured delay as a sync offset.

use delaymeter::audio::signal::{delayed, program_audio};
use delaymeter::meter::source::sync_offset_ns;
use delaymeter::{
    AudioBlock, DelayMeter, EngineConfig, MeasurementError, SourceRegistry, StreamSource,
    SyncOffsetTarget, TargetSink,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const RATE: u32 = 8000;

/// Stereo host stream delivering interleaved float blocks
struct StereoStream {
    name: String,
    sink: Mutex<Option<TargetSink>>,
}

impl StereoStream {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sink: Mutex::new(None),
        })
    }

    /// Deliver mono audio as the left channel of a stereo block
    fn deliver(&self, mono: &[f32]) -> bool {
        let interleaved: Vec<f32> = mono.iter().flat_map(|&s| [s, -1.0]).collect();
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.write_block(AudioBlock::Interleaved {
                samples: &interleaved,
                channels: 2,
            }),
            None => false,
        }
    }

    fn is_connected(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }
}

impl StreamSource for StereoStream {
    fn id(&self) -> &str {
        &self.name
    }

    fn connect(&self, sink: TargetSink) -> bool {
        *self.sink.lock().unwrap() = Some(sink);
        true
    }

    fn disconnect(&self) {
        self.sink.lock().unwrap().take();
    }
}

#[derive(Default)]
struct Host {
    streams: Mutex<HashMap<String, Arc<StereoStream>>>,
}

impl Host {
    fn publish(&self, stream: Arc<StereoStream>) {
        self.streams
            .lock()
            .unwrap()
            .insert(stream.name.clone(), stream);
    }
}

impl SourceRegistry for Host {
    fn lookup(&self, id: &str) -> Option<Arc<dyn StreamSource>> {
        self.streams
            .lock()
            .unwrap()
            .get(id)
            .map(|s| Arc::clone(s) as Arc<dyn StreamSource>)
    }
}

/// Reference source with an adjustable sync offset
struct Parent {
    offset_ns: Mutex<Option<i64>>,
    alive: AtomicBool,
}

impl Parent {
    fn new() -> Self {
        Self {
            offset_ns: Mutex::new(None),
            alive: AtomicBool::new(true),
        }
    }
}

impl SyncOffsetTarget for Parent {
    fn set_sync_offset(&self, offset_ns: i64) -> bool {
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }
        *self.offset_ns.lock().unwrap() = Some(offset_ns);
        true
    }
}

fn meter_with_host(host: Arc<Host>) -> DelayMeter {
    let config = EngineConfig::new(RATE)
        .with_window_ms(1000)
        .with_max_lag_ms(100);
    DelayMeter::new(config).unwrap().with_registry(host)
}

/// Run reference and stream callbacks side by side
fn run_callbacks(meter: &DelayMeter, stream: &StereoStream, reference: &[f32], target: &[f32]) {
    for (r, t) in reference.chunks(80).zip(target.chunks(80)) {
        meter.write_reference(r);
        stream.deliver(t);
    }
}

#[test]
fn test_measure_through_registered_stream() {
    let host = Arc::new(Host::default());
    let stream = StereoStream::new("Camera 2");
    host.publish(stream.clone());

    let meter = meter_with_host(host);
    meter.connect_target("Camera 2");
    assert!(stream.is_connected());

    let reference = program_audio(41, RATE, 12000);
    run_callbacks(&meter, &stream, &reference, &delayed(&reference, 100));

    let result = meter.measure();
    assert!(result.valid);
    assert_eq!(result.lag_samples, 100);
    assert_eq!(result.notes_text, "Target 'Camera 2' lags reference by 12.5 ms");
}

#[test]
fn test_stream_published_after_connect() {
    let host = Arc::new(Host::default());
    let meter = meter_with_host(host.clone());
    meter.connect_target("Late Camera");

    let reference = program_audio(42, RATE, 12000);
    meter.write_reference(&reference[..800]);
    assert_eq!(
        meter.measure().reason,
        Some(MeasurementError::NoTarget),
        "Pending target cannot be measured"
    );

    let stream = StereoStream::new("Late Camera");
    host.publish(stream.clone());
    meter.clear_buffers();

    // The next reference callback picks up the new stream
    run_callbacks(&meter, &stream, &reference, &delayed(&reference, -40));
    assert!(stream.is_connected());

    let result = meter.measure();
    assert!(result.valid);
    assert_eq!(result.lag_samples, -40);
}

#[test]
fn test_switching_streams_releases_previous() {
    let host = Arc::new(Host::default());
    let first = StereoStream::new("A");
    let second = StereoStream::new("B");
    host.publish(first.clone());
    host.publish(second.clone());

    let meter = meter_with_host(host);
    meter.connect_target("A");
    let reference = program_audio(43, RATE, 12000);
    run_callbacks(&meter, &first, &reference, &reference);

    meter.connect_target("B");
    assert!(!first.is_connected());
    assert!(second.is_connected());
    assert_eq!(meter.buffered(), (12000, 0));

    meter.disconnect_target();
    assert!(!second.is_connected());
    assert_eq!(meter.target_name(), None);
}

#[test]
fn test_apply_measured_delay_as_offset() {
    let host = Arc::new(Host::default());
    let stream = StereoStream::new("Camera 2");
    host.publish(stream.clone());
    let meter = meter_with_host(host);
    meter.connect_target("Camera 2");

    let reference = program_audio(44, RATE, 12000);
    run_callbacks(&meter, &stream, &reference, &delayed(&reference, 339));

    let measured = meter.measure();
    assert!(measured.valid);
    assert_eq!(measured.delay_ms, 42.375);

    let parent = Parent::new();
    let applied = meter.apply_as_offset(Some(&parent));
    assert_eq!(applied.display_text, "Applied +42.4 ms to Sync Offset");
    assert_eq!(applied.notes_text, "Sync Offset updated on reference source.");
    assert!(!applied.valid);
    assert_eq!(*parent.offset_ns.lock().unwrap(), Some(42_375_000));
    assert_eq!(sync_offset_ns(measured.delay_ms), 42_375_000);

    let again = meter.apply_as_offset(Some(&parent));
    assert_eq!(again.reason, Some(MeasurementError::NoRecentMeasurement));
    assert_eq!(again.display_text, "No recent measurement");
}

#[test]
fn test_apply_without_usable_parent() {
    let meter = DelayMeter::new(EngineConfig::new(RATE).with_max_lag_ms(50)).unwrap();
    meter.connect_target("Mic");
    let reference = program_audio(45, RATE, 12000);
    meter.write_reference(&reference);
    meter.write_target(&delayed(&reference, -16));
    assert!(meter.measure().valid);

    let result = meter.apply_as_offset(None);
    assert_eq!(result.display_text, "No parent source");

    let parent = Parent::new();
    parent.alive.store(false, Ordering::SeqCst);
    let result = meter.apply_as_offset(Some(&parent));
    assert_eq!(result.display_text, "Parent unavailable");

    parent.alive.store(true, Ordering::SeqCst);
    let result = meter.apply_as_offset(Some(&parent));
    assert_eq!(result.display_text, "Applied -2.0 ms to Sync Offset");
    assert_eq!(*parent.offset_ns.lock().unwrap(), Some(-2_000_000));
}
