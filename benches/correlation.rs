//! Performance benchmarks for the lag search

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use delaymeter::audio::conditioner::condition;
use delaymeter::audio::correlation::{find_best_lag, ms_to_samples};
use delaymeter::audio::signal::{delayed, program_audio};

const RATE: u32 = 48000;

fn conditioned_pair(window_ms: u32, shift: i64) -> (Vec<f32>, Vec<f32>) {
    let frames = ms_to_samples(window_ms, RATE);
    let mut reference = program_audio(7, RATE, frames);
    let mut target = delayed(&reference, shift);
    condition(&mut reference);
    condition(&mut target);
    (reference, target)
}

fn bench_find_best_lag(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_best_lag");
    group.sample_size(10);

    // (window ms, max lag ms)
    for (window_ms, lag_ms) in [(200, 50), (500, 100), (1000, 100)] {
        let (reference, target) = conditioned_pair(window_ms, 480);
        let max_lag = ms_to_samples(lag_ms, RATE);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}ms_window_{}ms_lag", window_ms, lag_ms)),
            &max_lag,
            |b, &max_lag| {
                b.iter(|| find_best_lag(black_box(&reference), black_box(&target), max_lag));
            },
        );
    }
    group.finish();
}

fn bench_condition(c: &mut Criterion) {
    let source = program_audio(3, RATE, ms_to_samples(1000, RATE));
    c.bench_function("condition_1s", |b| {
        b.iter(|| {
            let mut samples = source.clone();
            condition(black_box(&mut samples));
            samples
        });
    });
}

criterion_group!(benches, bench_find_best_lag, bench_condition);
criterion_main!(benches);
