//! E2E tests for concurrent producers, measurements and result consumers
//!
//! Reference and target audio arrive on independent threads while a
//! control thread measures and a presentation thread consumes results.

use delaymeter::audio::signal::{delayed, program_audio};
use delaymeter::{DelayMeter, EngineConfig, MeasurementError, MeterState};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const RATE: u32 = 8000;

fn meter() -> Arc<DelayMeter> {
    let config = EngineConfig::new(RATE)
        .with_window_ms(500)
        .with_max_lag_ms(100);
    let meter = DelayMeter::new(config).unwrap();
    meter.connect_target("Remote");
    Arc::new(meter)
}

#[test]
fn test_producers_on_separate_threads() {
    let meter = meter();
    let reference = Arc::new(program_audio(31, RATE, 24000));
    let target = Arc::new(delayed(&reference, 56));

    let ref_writer = {
        let meter = Arc::clone(&meter);
        let reference = Arc::clone(&reference);
        thread::spawn(move || {
            for chunk in reference.chunks(64) {
                meter.write_reference(chunk);
            }
        })
    };
    let tgt_writer = {
        let meter = Arc::clone(&meter);
        let target = Arc::clone(&target);
        thread::spawn(move || {
            // Different block size than the reference callback
            for chunk in target.chunks(100) {
                meter.write_target(chunk);
            }
        })
    };

    ref_writer.join().unwrap();
    tgt_writer.join().unwrap();

    assert_eq!(meter.buffered(), (24000, 24000));
    let result = meter.measure();
    assert!(result.valid);
    assert_eq!(result.lag_samples, 56);
    assert_eq!(meter.state(), MeterState::Idle);
}

#[test]
fn test_measuring_while_writing() {
    let meter = meter();
    let reference = Arc::new(program_audio(32, RATE, 40000));
    let target = Arc::new(delayed(&reference, -24));

    let writers: Vec<_> = [Arc::clone(&reference), Arc::clone(&target)]
        .into_iter()
        .enumerate()
        .map(|(index, signal)| {
            let meter = Arc::clone(&meter);
            thread::spawn(move || {
                for chunk in signal.chunks(80) {
                    if index == 0 {
                        meter.write_reference(chunk);
                    } else {
                        meter.write_target(chunk);
                    }
                }
            })
        })
        .collect();

    // Mid-stream results depend on how far each producer got; they only
    // have to be well-formed
    for _ in 0..5 {
        let result = meter.measure();
        if !result.valid {
            assert!(result.reason.is_some());
        }
    }

    for writer in writers {
        writer.join().unwrap();
    }

    let result = meter.measure();
    assert!(result.valid);
    assert_eq!(result.lag_samples, -24);
}

#[test]
fn test_results_handed_to_presentation_thread() {
    let meter = meter();
    let results = meter.subscribe();

    let consumer = thread::spawn(move || {
        let mut texts = Vec::new();
        // Ends once the meter (and with it the sender) is dropped
        while let Ok(result) = results.recv() {
            texts.push(result.display_text);
        }
        texts
    });

    let reference = program_audio(33, RATE, 8000);
    meter.measure();
    for (r, t) in reference.chunks(80).zip(delayed(&reference, 8).chunks(80)) {
        meter.write_reference(r);
        meter.write_target(t);
    }
    meter.measure();
    meter.disconnect_target();
    meter.measure();
    drop(meter);

    let texts = consumer.join().unwrap();
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[0], "Buffers too small");
    assert!(texts[1].contains("+1.0 ms"));
    assert_eq!(texts[2], "No target source");
}

#[test]
fn test_configure_during_writes() {
    let meter = meter();
    let reference = Arc::new(program_audio(34, RATE, 16000));

    let writer = {
        let meter = Arc::clone(&meter);
        let reference = Arc::clone(&reference);
        thread::spawn(move || {
            for chunk in reference.chunks(80) {
                meter.write_reference(chunk);
                meter.write_target(chunk);
            }
        })
    };

    for window in [200, 400, 600, 800] {
        meter.configure(window, 100, false);
    }
    writer.join().unwrap();

    assert_eq!(meter.config().analysis_window_ms, 800);
    let measurement = meter.try_measure().unwrap();
    assert_eq!(measurement.lag_samples, 0);
    assert_eq!(measurement.frames, 6400);
}

#[test]
fn test_concurrent_measurements() {
    let meter = meter();
    let reference = program_audio(35, RATE, 8000);
    let target = delayed(&reference, 40);
    meter.write_reference(&reference);
    meter.write_target(&target);

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let meter = Arc::clone(&meter);
            thread::spawn(move || meter.try_measure())
        })
        .collect();

    for handle in handles {
        let measurement = handle.join().unwrap().unwrap();
        assert_eq!(measurement.lag_samples, 40);
    }
    assert_eq!(meter.state(), MeterState::Idle);
    assert_ne!(meter.last_result().reason, Some(MeasurementError::NoTarget));
}

#[test]
fn test_writes_proceed_during_lag_search() {
    // 3 s window and 1.5 s lag range: a search of 24001 lags over 24000 frames
    let config = EngineConfig::new(RATE)
        .with_window_ms(3000)
        .with_max_lag_ms(1500);
    let meter = Arc::new(DelayMeter::new(config).unwrap());
    meter.connect_target("Remote");
    let reference = program_audio(36, RATE, 24000);
    meter.write_reference(&reference);
    meter.write_target(&delayed(&reference, 8));

    let measurer = {
        let meter = Arc::clone(&meter);
        thread::spawn(move || meter.try_measure())
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while meter.state() != MeterState::Measuring {
        assert!(Instant::now() < deadline, "Measurement never started");
        thread::yield_now();
    }

    let block = [0.0f32; 80];
    for _ in 0..50 {
        meter.write_reference(&block);
        meter.write_target(&block);
    }
    let (reference_len, _) = meter.buffered();
    assert_eq!(
        meter.state(),
        MeterState::Measuring,
        "Writes had to wait for the lag search"
    );
    assert_eq!(reference_len, 24000 + 50 * 80);

    // The snapshot may include some of the blocks above, so only the
    // completion matters here
    let _ = measurer.join().unwrap();
    assert_eq!(meter.state(), MeterState::Idle);
}
