// Performance benchmarks for the equalizer
//
// Run with: cargo bench -p sixband-core --bench eq_bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sixband_core::domain::{
    AtomicParameterStore, ChainCoefficients, ChainSettings, Effect, ParamId, ParametricEq,
    ProcessSpec, Slope,
};
use std::f32::consts::PI;
use std::hint::black_box;
use std::sync::Arc;

const SAMPLE_RATE: f64 = 48000.0;

/// Mix of 100 Hz, 1 kHz and 10 kHz
fn generate_test_buffer(frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (2.0 * PI * 100.0 * t).sin() * 0.3
                + (2.0 * PI * 1000.0 * t).sin() * 0.3
                + (2.0 * PI * 10000.0 * t).sin() * 0.3
        })
        .collect()
}

/// Every band active, both cuts at 48 dB/oct
fn busy_store() -> Arc<AtomicParameterStore> {
    let store = Arc::new(AtomicParameterStore::new());
    store
        .apply([
            (ParamId::LowCutFreq, 40.0),
            (ParamId::LowCutSlope, 3.0),
            (ParamId::LowShelfGain, 3.0),
            (ParamId::LowMidGain, -4.0),
            (ParamId::MidGain, 2.5),
            (ParamId::HighShelfGain, -6.0),
            (ParamId::HighCutFreq, 16000.0),
            (ParamId::HighCutSlope, 3.0),
        ])
        .expect("benchmark parameters are finite");
    store
}

fn bench_stereo_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("stereo_block");

    for size in [64, 256, 512, 1024, 2048].iter() {
        let mut eq = ParametricEq::new(busy_store());
        eq.prepare(ProcessSpec::stereo(SAMPLE_RATE, *size))
            .expect("valid spec");
        let mut left = generate_test_buffer(*size);
        let mut right = left.clone();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                eq.process(black_box(&mut left), black_box(&mut right))
                    .expect("prepared");
            });
        });
    }

    group.finish();
}

fn bench_interleaved_block(c: &mut Criterion) {
    let mut eq = ParametricEq::new(busy_store());
    eq.prepare(ProcessSpec::stereo(SAMPLE_RATE, 512))
        .expect("valid spec");
    let mut buffer = generate_test_buffer(1024);

    c.bench_function("interleaved_512_frames", |b| {
        b.iter(|| {
            Effect::process(&mut eq, black_box(&mut buffer)).expect("prepared");
        });
    });
}

fn bench_coefficient_design(c: &mut Criterion) {
    let mut group = c.benchmark_group("coefficient_design");

    for slope in Slope::ALL {
        let mut settings = ChainSettings::default();
        settings.low_cut.slope = slope;
        settings.high_cut.slope = slope;

        group.bench_with_input(
            BenchmarkId::from_parameter(slope.db_per_octave()),
            &settings,
            |b, settings| {
                b.iter(|| black_box(ChainCoefficients::design(black_box(settings), SAMPLE_RATE)));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_stereo_block,
    bench_interleaved_block,
    bench_coefficient_design
);
criterion_main!(benches);
