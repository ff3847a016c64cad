//! Digital Signal Processing building blocks for the equalizer
//!
//! This module provides:
//! - The coefficient designer (RBJ shelves/peaks, Butterworth cut banks)
//! - The biquad filter stage used at every position of the chain
//! - The [`cut`] submodule with slopes and variable-order cut banks
//!
//! Everything here is designed for:
//! - Zero allocations in the hot path
//! - Stable, finite coefficients for every in-range parameter
//! - Coefficient swaps that keep the filter memory intact

pub mod cut;

use crate::domain::audio::AudioError;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub use cut::{CutBank, Slope};

pub type Result<T> = std::result::Result<T, AudioError>;

/// Core trait for all audio effects
///
/// All effects process audio in-place on interleaved f32 buffers.
pub trait Effect: Send + Sync {
    /// Process a buffer of audio samples in-place
    ///
    /// # Requirements
    /// - No allocations in the hot path
    /// - Handle buffer of any size, including empty
    fn process(&mut self, buffer: &mut [f32]) -> Result<()>;

    /// Reset effect state to initial conditions
    fn reset(&mut self);

    /// Check if effect is bypassed
    fn is_bypassed(&self) -> bool;

    /// Toggle bypass state
    fn set_bypass(&mut self, bypass: bool);

    /// Get effect name for debugging/display
    fn name(&self) -> &str;
}

/// Highest fraction of the sample rate a design frequency may reach.
///
/// Anything above is pulled just under Nyquist so `tan`/`sin` stay finite.
pub const MAX_FREQ_RATIO: f64 = 0.499;

/// Lowest design frequency in Hz
pub const MIN_DESIGN_FREQ: f64 = 1.0;

/// Smallest Q the designer accepts before clamping
pub const MIN_DESIGN_Q: f64 = 0.01;

/// Highest Butterworth order a cut bank can realize (4 sections)
pub const MAX_CUT_ORDER: usize = 8;

/// Number of second-order sections in a cut bank
pub const MAX_CUT_SECTIONS: usize = MAX_CUT_ORDER / 2;

/// Feedback values below this are flushed to zero
const DENORMAL_THRESHOLD: f64 = 1e-20;

/// Convert decibels to a linear amplitude factor
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear amplitude factor to decibels (floored at -200 dB)
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 1e-10 {
        -200.0
    } else {
        20.0 * gain.log10()
    }
}

/// Normalized angular frequency, clamped to the designable range
#[inline]
fn angular_frequency(sample_rate: f64, freq: f32) -> f64 {
    let nyquist_guard = sample_rate * MAX_FREQ_RATIO;
    let freq = (freq as f64).clamp(MIN_DESIGN_FREQ, nyquist_guard.max(MIN_DESIGN_FREQ));
    2.0 * PI * freq / sample_rate
}

// ============================================================================
// BIQUAD COEFFICIENTS (the coefficient designer)
// ============================================================================

/// Biquad filter coefficients
///
/// Coefficients are normalized so that a0 == 1. They are computed and kept in
/// f64: a 20 Hz section at 192 kHz puts its poles within 1e-3 of the unit
/// circle, where f32 coefficients visibly detune the response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BiquadCoeffs {
    /// Unity gain, no filtering
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Calculate coefficients for a low shelf filter
    ///
    /// Boosts or cuts frequencies below the corner frequency.
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz
    /// - `freq`: Corner frequency in Hz
    /// - `gain_db`: Shelf gain in decibels
    /// - `q`: Shelf Q; values above ~0.7 add a resonant bump at the corner
    #[must_use]
    pub fn low_shelf(sample_rate: f64, freq: f32, gain_db: f32, q: f32) -> Self {
        let a = 10.0_f64.powf(gain_db as f64 / 40.0);
        let w0 = angular_frequency(sample_rate, freq);
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * (q as f64).max(MIN_DESIGN_Q));
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha);

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Calculate coefficients for a high shelf filter
    ///
    /// Boosts or cuts frequencies above the corner frequency.
    #[must_use]
    pub fn high_shelf(sample_rate: f64, freq: f32, gain_db: f32, q: f32) -> Self {
        let a = 10.0_f64.powf(gain_db as f64 / 40.0);
        let w0 = angular_frequency(sample_rate, freq);
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * (q as f64).max(MIN_DESIGN_Q));
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha);

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Calculate coefficients for a peaking EQ filter
    ///
    /// Boosts or cuts frequencies around a center frequency.
    #[must_use]
    pub fn peaking(sample_rate: f64, freq: f32, gain_db: f32, q: f32) -> Self {
        let a = 10.0_f64.powf(gain_db as f64 / 40.0);
        let w0 = angular_frequency(sample_rate, freq);
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * (q as f64).max(MIN_DESIGN_Q));

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;

        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Second-order highpass with the given Q
    #[must_use]
    pub fn highpass(sample_rate: f64, freq: f32, q: f64) -> Self {
        let w0 = angular_frequency(sample_rate, freq);
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q.max(MIN_DESIGN_Q));

        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = b0;

        Self::normalized(b0, b1, b2, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    /// Second-order lowpass with the given Q
    #[must_use]
    pub fn lowpass(sample_rate: f64, freq: f32, q: f64) -> Self {
        let w0 = angular_frequency(sample_rate, freq);
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q.max(MIN_DESIGN_Q));

        let b0 = (1.0 - cos_w0) / 2.0;
        let b1 = 1.0 - cos_w0;
        let b2 = b0;

        Self::normalized(b0, b1, b2, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    /// First-order section (bilinear transform), stored with b2 = a2 = 0
    fn first_order(pass: PassType, sample_rate: f64, freq: f32) -> Self {
        let k = (angular_frequency(sample_rate, freq) / 2.0).tan();
        let a1 = (k - 1.0) / (k + 1.0);
        let (b0, b1) = match pass {
            PassType::Lowpass => {
                let b0 = k / (k + 1.0);
                (b0, b0)
            }
            PassType::Highpass => {
                let b0 = 1.0 / (k + 1.0);
                (b0, -b0)
            }
        };

        Self {
            b0,
            b1,
            b2: 0.0,
            a1,
            a2: 0.0,
        }
    }

    /// Complex frequency response H(e^jw) at `freq`
    pub fn response(&self, freq: f64, sample_rate: f64) -> Complex<f64> {
        let w = 2.0 * PI * freq / sample_rate;
        let z1 = Complex::from_polar(1.0, -w);
        let z2 = z1 * z1;

        let num = self.b0 + z1 * self.b1 + z2 * self.b2;
        let den = 1.0 + z1 * self.a1 + z2 * self.a2;
        num / den
    }

    /// Magnitude response in dB at `freq`
    pub fn magnitude_db(&self, freq: f64, sample_rate: f64) -> f64 {
        20.0 * self.response(freq, sample_rate).norm().max(1e-12).log10()
    }

    /// All five coefficients are finite
    pub fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
            .iter()
            .all(|c| c.is_finite())
    }

    /// Both poles lie strictly inside the unit circle (stability triangle)
    pub fn is_stable(&self) -> bool {
        self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }
}

// ============================================================================
// BUTTERWORTH CUT DESIGN
// ============================================================================

/// Which side of the spectrum a cut bank removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassType {
    /// Low-cut: passes frequencies above the cutoff
    Highpass,
    /// High-cut: passes frequencies below the cutoff
    Lowpass,
}

/// Designed sections for one cut bank
///
/// Always holds [`MAX_CUT_SECTIONS`] entries; only the first `len()` belong
/// to the design, the rest are identity and must not be used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutCoeffs {
    sections: [BiquadCoeffs; MAX_CUT_SECTIONS],
    len: usize,
}

impl Default for CutCoeffs {
    fn default() -> Self {
        Self {
            sections: [BiquadCoeffs::IDENTITY; MAX_CUT_SECTIONS],
            len: 0,
        }
    }
}

impl CutCoeffs {
    /// Sections produced by the design, in cascade order
    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections[..self.len]
    }

    /// Entry for a bank slot; slots past `len()` are identity
    pub fn get(&self, index: usize) -> BiquadCoeffs {
        self.sections
            .get(index)
            .copied()
            .unwrap_or(BiquadCoeffs::IDENTITY)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Design an Nth-order Butterworth highpass or lowpass
///
/// Produces `ceil(order / 2)` sections: one first-order section for odd orders,
/// followed by one second-order section per conjugate pole pair. Pair `k` sits
/// at angle `pi * (2k + 1 + order % 2) / (2 * order)` from the negative real
/// axis, giving `Q = 1 / (2 cos(angle))`; for order 4 that is 0.541 and 1.307.
///
/// `order` is clamped to `1..=MAX_CUT_ORDER`.
#[must_use]
pub fn butterworth(pass: PassType, sample_rate: f64, cutoff: f32, order: usize) -> CutCoeffs {
    let order = order.clamp(1, MAX_CUT_ORDER);
    let mut coeffs = CutCoeffs::default();
    let odd = order % 2;

    if odd == 1 {
        coeffs.sections[coeffs.len] = BiquadCoeffs::first_order(pass, sample_rate, cutoff);
        coeffs.len += 1;
    }

    for k in 0..order / 2 {
        let angle = PI * (2 * k + 1 + odd) as f64 / (2 * order) as f64;
        let q = 1.0 / (2.0 * angle.cos());
        coeffs.sections[coeffs.len] = match pass {
            PassType::Highpass => BiquadCoeffs::highpass(sample_rate, cutoff, q),
            PassType::Lowpass => BiquadCoeffs::lowpass(sample_rate, cutoff, q),
        };
        coeffs.len += 1;
    }

    coeffs
}

// ============================================================================
// BIQUAD FILTER STAGE
// ============================================================================

/// Stateful biquad filter using Direct Form I
///
/// Direct Form I keeps the raw input/output history, so replacing the
/// coefficients between blocks never invalidates the stored state: the next
/// sample is computed from real past samples with the new coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f64,
    x2: f64,
    // Previous output samples (y[n-1], y[n-2])
    y1: f64,
    y2: f64,
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::bypass()
    }
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Create a bypass filter (unity gain)
    pub fn bypass() -> Self {
        Self::new(BiquadCoeffs::IDENTITY)
    }

    /// Replace the coefficients, leaving the delay memory untouched
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Delay memory as `[x1, x2, y1, y2]`
    pub fn state(&self) -> [f64; 4] {
        [self.x1, self.x2, self.y1, self.y2]
    }

    /// True when every delay slot is zero
    pub fn is_cleared(&self) -> bool {
        self.state().iter().all(|s| *s == 0.0)
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let mut y = self.coeffs.b0 * x + self.coeffs.b1 * self.x1 + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        if y.abs() < DENORMAL_THRESHOLD {
            y = 0.0;
        }

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Process a buffer of samples
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample as f64) as f32;
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

// ============================================================================
// TESTS
// ============================================================================
