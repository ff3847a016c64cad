//! Allocation-free test signal source for playback

use sixband_core::domain::{db_to_gain, SignalKind};
use std::f64::consts::TAU;

/// Sine or white-noise generator
///
/// Renders the same sample to every channel of a frame.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    kind: SignalKind,
    amplitude: f32,
    phase: f64,
    phase_increment: f64,
    sample_rate: f64,
    // xorshift32 state, never zero
    noise_state: u32,
}

impl SignalGenerator {
    pub fn new(kind: SignalKind, frequency_hz: f32, level_db: f32, sample_rate: f64) -> Self {
        let mut generator = Self {
            kind,
            amplitude: 0.0,
            phase: 0.0,
            phase_increment: 0.0,
            sample_rate,
            noise_state: 0x9E37_79B9,
        };
        generator.set_level_db(level_db);
        generator.set_frequency(frequency_hz);
        generator
    }

    /// Start the noise sequence from `seed` (zero is replaced by one)
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.noise_state = seed.max(1);
        self
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Output level in dBFS, capped at 0 dB
    pub fn set_level_db(&mut self, level_db: f32) {
        self.amplitude = db_to_gain(level_db.min(0.0));
    }

    /// Sine frequency, kept below Nyquist
    pub fn set_frequency(&mut self, frequency_hz: f32) {
        let frequency = (frequency_hz as f64).clamp(0.0, self.sample_rate * 0.5);
        self.phase_increment = TAU * frequency / self.sample_rate;
    }

    #[inline]
    fn next_noise(&mut self) -> f32 {
        let mut x = self.noise_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise_state = x;
        // Map to [-1, 1)
        (x as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let value = match self.kind {
            SignalKind::Sine => {
                let value = self.phase.sin() as f32;
                self.phase = (self.phase + self.phase_increment) % TAU;
                value
            }
            SignalKind::Noise => self.next_noise(),
        };
        value * self.amplitude
    }

    /// Fill an interleaved buffer
    pub fn fill_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in buffer.chunks_mut(channels) {
            let sample = self.next_sample();
            frame.fill(sample);
        }
    }
}
