//! Measured frequency response
//!
//! Runs an impulse through a prepared equalizer and takes its FFT. This gives
//! the response of the filters as they actually process audio, which should
//! agree with the analytic curve from the installed coefficients.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::Serialize;
use sixband_core::domain::audio::{AudioError, Result};
use sixband_core::domain::{Effect, ParametricEq};
use tracing::debug;

/// Smallest FFT the analyzer accepts
pub const MIN_FFT_SIZE: usize = 64;

/// One measured point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResponsePoint {
    pub frequency: f64,
    pub magnitude_db: f64,
}

/// Magnitude response from DC to Nyquist
#[derive(Debug, Clone, Serialize)]
pub struct MeasuredResponse {
    pub sample_rate: f64,
    pub fft_size: usize,
    pub points: Vec<ResponsePoint>,
}

impl MeasuredResponse {
    pub fn bin_width(&self) -> f64 {
        self.sample_rate / self.fft_size as f64
    }

    /// Point of the bin closest to `frequency`
    pub fn nearest(&self, frequency: f64) -> Option<&ResponsePoint> {
        let bin = (frequency / self.bin_width()).round();
        if bin < 0.0 {
            return None;
        }
        self.points.get(bin as usize)
    }
}

/// Measure `eq`'s left-channel response with an FFT of `fft_size` points
///
/// Filter memory is cleared before and after, so the measurement does not
/// depend on (or leak into) earlier audio.
pub fn measure(eq: &mut ParametricEq, fft_size: usize) -> Result<MeasuredResponse> {
    let spec = *eq.spec().ok_or(AudioError::NotPrepared)?;
    if fft_size < MIN_FFT_SIZE {
        return Err(AudioError::InvalidConfiguration(format!(
            "FFT size must be at least {MIN_FFT_SIZE}, got {fft_size}"
        )));
    }

    let mut left = vec![0.0_f32; fft_size];
    let mut right = vec![0.0_f32; fft_size];
    left[0] = 1.0;
    right[0] = 1.0;

    eq.reset();
    let block = spec.maximum_block_size;
    for (l, r) in left.chunks_mut(block).zip(right.chunks_mut(block)) {
        if spec.num_channels == 1 {
            eq.process_mono(l)?;
        } else {
            eq.process(l, r)?;
        }
    }
    eq.reset();

    let mut spectrum: Vec<Complex<f64>> = left
        .iter()
        .map(|&s| Complex::new(s as f64, 0.0))
        .collect();
    FftPlanner::new()
        .plan_fft_forward(fft_size)
        .process(&mut spectrum);

    let bin_width = spec.sample_rate / fft_size as f64;
    let points = spectrum[..=fft_size / 2]
        .iter()
        .enumerate()
        .map(|(bin, value)| ResponsePoint {
            frequency: bin as f64 * bin_width,
            magnitude_db: 20.0 * value.norm().max(1e-10).log10(),
        })
        .collect::<Vec<_>>();

    debug!(fft_size, bins = points.len(), "Measured response");

    Ok(MeasuredResponse {
        sample_rate: spec.sample_rate,
        fft_size,
        points,
    })
}
