//! Integration tests for the equalizer
//!
//! These tests drive the full path a host would: parameter store → block
//! orchestrator → both channel chains, plus configuration files and the
//! measured response from the infra analyzer.

use proptest::prelude::*;
use sixband_core::domain::{
    AtomicParameterStore, ChannelProcessor, Effect, ParamId, ParameterStore, ParametricEq,
    ProcessSpec, SignalKind, SixbandConfig, Slope,
};
use sixband_infra::analyzer;
use sixband_infra::audio::SignalGenerator;
use std::f64::consts::PI;
use std::sync::Arc;
use tempfile::TempDir;

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK: usize = 256;

fn generate_sine_wave(frequency: f64, amplitude: f64, samples: usize) -> Vec<f32> {
    (0..samples)
        .map(|i| (amplitude * (2.0 * PI * frequency * i as f64 / SAMPLE_RATE).sin()) as f32)
        .collect()
}

/// Half-scale white noise from the playback signal generator
fn generate_noise(samples: usize, seed: u32) -> Vec<f32> {
    let mut generator =
        SignalGenerator::new(SignalKind::Noise, 0.0, -6.0, SAMPLE_RATE).with_seed(seed);
    let mut buffer = vec![0.0; samples];
    generator.fill_interleaved(&mut buffer, 1);
    buffer
}

fn prepared(store: &Arc<AtomicParameterStore>, sample_rate: f64) -> ParametricEq {
    let mut eq = ParametricEq::new(store.clone());
    eq.prepare(ProcessSpec::stereo(sample_rate, BLOCK))
        .expect("valid spec");
    eq
}

/// Run `left`/`right` through `eq` in BLOCK-sized pieces
fn process_blocks(eq: &mut ParametricEq, left: &mut [f32], right: &mut [f32]) {
    for (l, r) in left.chunks_mut(BLOCK).zip(right.chunks_mut(BLOCK)) {
        eq.process(l, r).expect("prepared");
    }
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

// ============================================================================
// SLOPE EXPANSION
// ============================================================================

#[test]
fn test_slope_sets_active_stage_count() {
    let store = Arc::new(AtomicParameterStore::new());
    let mut eq = prepared(&store, SAMPLE_RATE);

    for slope in Slope::ALL {
        store.set(ParamId::LowCutSlope, slope.index() as f32).unwrap();
        store
            .set(ParamId::HighCutSlope, (3 - slope.index()) as f32)
            .unwrap();

        let mut left = generate_sine_wave(500.0, 0.5, BLOCK);
        let mut right = left.clone();
        eq.process(&mut left, &mut right).unwrap();

        for channel in [eq.left(), eq.right()] {
            let low_cut = channel.chain().low_cut();
            let high_cut = channel.chain().high_cut();
            assert_eq!(low_cut.active_stages(), slope.index() + 1);
            assert_eq!(high_cut.active_stages(), 4 - slope.index());

            // Active stages are a prefix, bypassed stages hold no memory
            for stage in 0..4 {
                let active = stage <= slope.index();
                assert_eq!(low_cut.is_bypassed(stage), !active);
                if !active {
                    assert!(low_cut.stage(stage).is_some_and(|s| s.is_cleared()));
                }
            }
        }
    }
}

#[test]
fn test_slope_reduction_clears_dropped_stages() {
    let store = Arc::new(AtomicParameterStore::new());
    store.set(ParamId::LowCutFreq, 300.0).unwrap();
    store.set(ParamId::LowCutSlope, 3.0).unwrap();
    let mut eq = prepared(&store, SAMPLE_RATE);

    let mut left = generate_noise(BLOCK * 4, 7);
    let mut right = left.clone();
    process_blocks(&mut eq, &mut left, &mut right);
    assert!(!eq
        .left()
        .chain()
        .low_cut()
        .stage(3)
        .is_some_and(|s| s.is_cleared()));

    store.set(ParamId::LowCutSlope, 0.0).unwrap();
    let mut left = generate_noise(BLOCK, 8);
    let mut right = left.clone();
    eq.process(&mut left, &mut right).unwrap();

    for channel in [eq.left(), eq.right()] {
        let low_cut = channel.chain().low_cut();
        assert!(!low_cut.stage(0).is_some_and(|s| s.is_cleared()));
        for stage in 1..4 {
            assert!(low_cut.stage(stage).is_some_and(|s| s.is_cleared()));
        }
    }
}

// ============================================================================
// TRANSPARENCY AND CONTINUITY
// ============================================================================

#[test]
fn test_flat_settings_pass_sine_within_one_percent() {
    let store = Arc::new(AtomicParameterStore::new());
    let mut eq = prepared(&store, SAMPLE_RATE);

    let input = generate_sine_wave(1000.0, 0.5, BLOCK * 40);
    let mut left = input.clone();
    let mut right = input.clone();
    process_blocks(&mut eq, &mut left, &mut right);

    // Skip the first blocks while the 20 Hz low cut settles
    let settled = BLOCK * 20;
    let ratio = peak(&left[settled..]) / peak(&input[settled..]);
    assert!((ratio - 1.0).abs() < 0.01, "magnitude ratio {ratio}");
    assert_eq!(left, right);
}

#[test]
fn test_shelf_gain_change_is_click_free() {
    let store = Arc::new(AtomicParameterStore::new());
    let mut eq = prepared(&store, SAMPLE_RATE);

    // Well below the 150 Hz corner, where the shelf applies its full gain
    let frequency = 80.0;
    let blocks = 40;
    let mut left = generate_sine_wave(frequency, 0.5, BLOCK * blocks);
    let mut right = left.clone();

    for (index, (l, r)) in left
        .chunks_mut(BLOCK)
        .zip(right.chunks_mut(BLOCK))
        .enumerate()
    {
        if index == blocks / 2 {
            store.set(ParamId::LowShelfGain, 6.0).unwrap();
        }
        eq.process(l, r).unwrap();
    }

    // A sine of amplitude A moves at most 2*pi*f*A/sr per sample. Even with the
    // boosted amplitude, the largest step must stay within that envelope.
    let max_amplitude = 0.5 * 2.5;
    let max_step = 2.0 * PI * frequency * max_amplitude / SAMPLE_RATE;
    let worst = left
        .windows(2)
        .skip(BLOCK * 4)
        .map(|w| (w[1] - w[0]).abs() as f64)
        .fold(0.0_f64, f64::max);
    assert!(worst < max_step * 1.1, "step {worst} > {max_step}");

    // And the boost actually took effect
    let before = peak(&left[BLOCK * 16..BLOCK * 20]);
    let after = peak(&left[BLOCK * 36..]);
    assert!(after > before * 1.8, "before {before} after {after}");
}

// ============================================================================
// BLOCK HANDLING
// ============================================================================

#[test]
fn test_empty_block_changes_nothing() {
    let store = Arc::new(AtomicParameterStore::new());
    store.set(ParamId::MidGain, 9.0).unwrap();
    let mut eq = prepared(&store, SAMPLE_RATE);

    let mut left = generate_noise(BLOCK, 3);
    let mut right = generate_noise(BLOCK, 5);
    eq.process(&mut left, &mut right).unwrap();

    let left_before: ChannelProcessor = eq.left().clone();
    let right_before: ChannelProcessor = eq.right().clone();

    // Even a pending parameter change is not picked up by an empty block
    store.set(ParamId::MidGain, -9.0).unwrap();
    eq.process(&mut [], &mut []).unwrap();
    Effect::process(&mut eq, &mut []).unwrap();

    assert_eq!(eq.left(), &left_before);
    assert_eq!(eq.right(), &right_before);
}

#[test]
fn test_smaller_final_block_is_accepted() {
    let store = Arc::new(AtomicParameterStore::new());
    let mut eq = prepared(&store, SAMPLE_RATE);

    let mut left = generate_noise(BLOCK + 17, 11);
    let mut right = left.clone();
    process_blocks(&mut eq, &mut left, &mut right);
    assert!(left.iter().all(|s| s.is_finite()));
}

#[test]
fn test_identical_channels_stay_identical() {
    let store = Arc::new(AtomicParameterStore::new());
    store
        .apply([
            (ParamId::LowCutFreq, 80.0),
            (ParamId::LowCutSlope, 2.0),
            (ParamId::LowShelfGain, -3.0),
            (ParamId::LowMidGain, 4.5),
            (ParamId::LowMidQ, 3.0),
            (ParamId::MidGain, -7.0),
            (ParamId::HighShelfGain, 2.0),
            (ParamId::HighCutFreq, 9000.0),
            (ParamId::HighCutSlope, 1.0),
        ])
        .unwrap();
    let mut eq = prepared(&store, SAMPLE_RATE);

    let mut left = generate_noise(BLOCK * 8, 42);
    let mut right = left.clone();
    process_blocks(&mut eq, &mut left, &mut right);

    assert_eq!(left, right);
}

#[test]
fn test_channels_have_independent_memory() {
    let store = Arc::new(AtomicParameterStore::new());
    store.set(ParamId::MidGain, 6.0).unwrap();
    let mut eq = prepared(&store, SAMPLE_RATE);

    let mut left = generate_noise(BLOCK, 1);
    let mut right = vec![0.0; BLOCK];
    eq.process(&mut left, &mut right).unwrap();

    assert!(right.iter().all(|&s| s == 0.0));
    assert_ne!(eq.left(), eq.right());
}

// ============================================================================
// LIVE PARAMETER UPDATES
// ============================================================================

#[test]
fn test_writer_thread_while_processing() {
    let store = Arc::new(AtomicParameterStore::new());
    let mut eq = prepared(&store, SAMPLE_RATE);

    let writer_store = Arc::clone(&store);
    let writer = std::thread::spawn(move || {
        for i in 0..500 {
            let normalized = (i % 100) as f32 / 100.0;
            for id in ParamId::ALL {
                writer_store.set_normalized(id, normalized).unwrap();
            }
        }
    });

    for seed in 1..200 {
        let mut left = generate_noise(BLOCK, seed);
        let mut right = left.clone();
        eq.process(&mut left, &mut right).unwrap();
        assert!(left.iter().all(|s| s.is_finite()));
        assert_eq!(left, right);
    }

    writer.join().unwrap();
}

#[test]
fn test_interleaved_effect_with_generator() {
    let store = Arc::new(AtomicParameterStore::new());
    store.set(ParamId::HighCutFreq, 1000.0).unwrap();
    store.set(ParamId::HighCutSlope, 3.0).unwrap();
    let mut eq = prepared(&store, SAMPLE_RATE);

    let mut generator = SignalGenerator::new(
        SignalKind::Sine,
        8000.0,
        -6.0,
        SAMPLE_RATE,
    );
    let mut buffer = vec![0.0; BLOCK * 2 * 16];
    generator.fill_interleaved(&mut buffer, 2);
    Effect::process(&mut eq, &mut buffer).unwrap();

    // 8 kHz is three octaves above a 48 dB/oct cut at 1 kHz
    let tail = &buffer[BLOCK * 2 * 8..];
    assert!(peak(tail) < 0.001, "peak {}", peak(tail));
}

// ============================================================================
// CONFIGURATION AND MEASUREMENT
// ============================================================================

#[tokio::test]
async fn test_config_file_drives_equalizer() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [app]
        sample_rate = 44100
        block_size = 128

        [parameters]
        MIDPEAKFREQ = 2000.0
        MIDPEAKGAIN = 12.0
        MIDPEAKQ = 2.0
        "#,
    )
    .unwrap();

    let config = SixbandConfig::load_from_file(&path).await.unwrap();
    let store = Arc::new(AtomicParameterStore::new());
    assert_eq!(config.apply_parameters(&store).unwrap(), 3);

    let mut eq = ParametricEq::new(store.clone());
    eq.prepare(ProcessSpec::from(&config.stream_config()))
        .unwrap();
    let mut left = vec![0.0; 128];
    let mut right = vec![0.0; 128];
    eq.process(&mut left, &mut right).unwrap();

    assert_eq!(store.value(ParamId::MidFreq), 2000.0);
    assert!((eq.magnitude_db(2000.0).unwrap() - 12.0).abs() < 0.01);
}

#[test]
fn test_measured_response_matches_analytic_at_96k() {
    let store = Arc::new(AtomicParameterStore::new());
    store
        .apply([
            (ParamId::LowCutFreq, 100.0),
            (ParamId::LowCutSlope, 1.0),
            (ParamId::LowMidGain, 5.0),
            (ParamId::HighShelfGain, -8.0),
            (ParamId::HighCutFreq, 15000.0),
            (ParamId::HighCutSlope, 2.0),
        ])
        .unwrap();
    let mut eq = prepared(&store, 96000.0);

    let measured = analyzer::measure(&mut eq, 16384).unwrap();
    for freq in [150.0, 750.0, 5000.0, 12000.0, 20000.0] {
        let point = measured.nearest(freq).unwrap();
        let analytic = eq.magnitude_db(point.frequency).unwrap();
        assert!(
            (point.magnitude_db - analytic).abs() < 0.05,
            "{} Hz: measured {} analytic {}",
            point.frequency,
            point.magnitude_db,
            analytic
        );
    }
}

// ============================================================================
// BOUNDARIES
// ============================================================================

fn boundary_value(id: ParamId, pick: u8) -> f32 {
    let range = id.range();
    match pick % 3 {
        0 => range.min,
        1 => range.max,
        _ => range.default,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_silence_in_silence_out(
        normalized in prop::collection::vec(0.0f32..=1.0, ParamId::COUNT),
        sample_rate in prop::sample::select(vec![22050.0, 44100.0, 48000.0, 96000.0]),
    ) {
        let store = Arc::new(AtomicParameterStore::new());
        for (id, p) in ParamId::ALL.into_iter().zip(normalized) {
            store.set_normalized(id, p).unwrap();
        }
        let mut eq = prepared(&store, sample_rate);

        let mut left = vec![0.0; BLOCK * 4];
        let mut right = vec![0.0; BLOCK * 4];
        process_blocks(&mut eq, &mut left, &mut right);

        prop_assert!(left.iter().chain(right.iter()).all(|&s| s == 0.0));
    }

    #[test]
    fn prop_boundary_parameters_stay_finite(
        picks in prop::collection::vec(any::<u8>(), ParamId::COUNT),
        sample_rate in prop::sample::select(vec![22050.0, 44100.0, 48000.0, 192000.0]),
        seed in 1u32..u32::MAX,
    ) {
        let store = Arc::new(AtomicParameterStore::new());
        for (id, pick) in ParamId::ALL.into_iter().zip(picks) {
            store.set(id, boundary_value(id, pick)).unwrap();
        }
        let mut eq = prepared(&store, sample_rate);

        let mut left = generate_noise(BLOCK * 8, seed);
        let mut right = left.clone();
        process_blocks(&mut eq, &mut left, &mut right);

        prop_assert!(left.iter().all(|s| s.is_finite()));
        prop_assert_eq!(left, right);
    }
}
