//! Six-stage parametric equalizer
//!
//! Signal flow per channel:
//!
//! ```text
//! [Low Cut] -> [Low Shelf] -> [Low-Mid Peak] -> [Mid Peak] -> [High Shelf] -> [High Cut]
//! ```
//!
//! Each block, [`ParametricEq`] takes one parameter snapshot, designs every
//! coefficient once and hands the same [`ChainCoefficients`] to both channels.

use crate::domain::audio::{AudioError, ProcessSpec};
use crate::domain::dsp::{
    butterworth, BiquadCoeffs, BiquadFilter, CutBank, CutCoeffs, Effect, PassType, Result, Slope,
};
use crate::domain::params::{BandSettings, ChainSettings, ParameterStore};
use num_complex::Complex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// The six logical positions of a chain, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainPosition {
    LowCut,
    LowShelf,
    LowMidPeak,
    MidPeak,
    HighShelf,
    HighCut,
}

impl ChainPosition {
    pub const ALL: [ChainPosition; 6] = [
        ChainPosition::LowCut,
        ChainPosition::LowShelf,
        ChainPosition::LowMidPeak,
        ChainPosition::MidPeak,
        ChainPosition::HighShelf,
        ChainPosition::HighCut,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChainPosition::LowCut => "Low Cut",
            ChainPosition::LowShelf => "Low Shelf",
            ChainPosition::LowMidPeak => "Low-Mid Peak",
            ChainPosition::MidPeak => "Mid Peak",
            ChainPosition::HighShelf => "High Shelf",
            ChainPosition::HighCut => "High Cut",
        }
    }
}

impl fmt::Display for ChainPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// CHAIN COEFFICIENTS
// ============================================================================

/// Every coefficient one chain needs, designed from a settings snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainCoefficients {
    pub low_cut: CutCoeffs,
    pub low_cut_slope: Slope,
    pub low_shelf: BiquadCoeffs,
    pub low_mid: BiquadCoeffs,
    pub mid: BiquadCoeffs,
    pub high_shelf: BiquadCoeffs,
    pub high_cut: CutCoeffs,
    pub high_cut_slope: Slope,
}

impl ChainCoefficients {
    /// Run the designer once per position
    pub fn design(settings: &ChainSettings, sample_rate: f64) -> Self {
        let band = |design: fn(f64, f32, f32, f32) -> BiquadCoeffs, b: &BandSettings| {
            design(sample_rate, b.frequency, b.gain_db, b.q)
        };

        Self {
            low_cut: butterworth(
                PassType::Highpass,
                sample_rate,
                settings.low_cut.frequency,
                settings.low_cut.slope.order(),
            ),
            low_cut_slope: settings.low_cut.slope,
            low_shelf: band(BiquadCoeffs::low_shelf, &settings.low_shelf),
            low_mid: band(BiquadCoeffs::peaking, &settings.low_mid),
            mid: band(BiquadCoeffs::peaking, &settings.mid),
            high_shelf: band(BiquadCoeffs::high_shelf, &settings.high_shelf),
            high_cut: butterworth(
                PassType::Lowpass,
                sample_rate,
                settings.high_cut.frequency,
                settings.high_cut.slope.order(),
            ),
            high_cut_slope: settings.high_cut.slope,
        }
    }

    /// All designed sections, cut banks limited to their active stages
    pub fn sections(&self) -> impl Iterator<Item = &BiquadCoeffs> + '_ {
        self.low_cut
            .sections()
            .iter()
            .take(self.low_cut_slope.sections())
            .chain([&self.low_shelf, &self.low_mid, &self.mid, &self.high_shelf])
            .chain(
                self.high_cut
                    .sections()
                    .iter()
                    .take(self.high_cut_slope.sections()),
            )
    }

    pub fn is_finite(&self) -> bool {
        self.sections().all(BiquadCoeffs::is_finite)
    }

    /// Magnitude of the designed response at `freq`, in dB
    pub fn magnitude_db(&self, freq: f64, sample_rate: f64) -> f64 {
        let response: Complex<f64> = self
            .sections()
            .map(|s| s.response(freq, sample_rate))
            .product();
        20.0 * response.norm().max(1e-12).log10()
    }
}

// ============================================================================
// MONO CHAIN
// ============================================================================

/// One channel's six stages: two cut banks around four biquads
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonoChain {
    low_cut: CutBank,
    low_shelf: BiquadFilter,
    low_mid: BiquadFilter,
    mid: BiquadFilter,
    high_shelf: BiquadFilter,
    high_cut: CutBank,
}

impl MonoChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the spec and clear every section's memory
    ///
    /// Section memory is fixed-size, so preparing never allocates.
    pub fn prepare(&mut self, spec: &ProcessSpec) -> Result<()> {
        spec.validate()?;
        self.reset();
        Ok(())
    }

    /// Install new coefficients, keeping delay memory
    pub fn update(&mut self, coeffs: &ChainCoefficients) {
        self.low_cut.configure(&coeffs.low_cut, coeffs.low_cut_slope);
        self.low_shelf.set_coeffs(coeffs.low_shelf);
        self.low_mid.set_coeffs(coeffs.low_mid);
        self.mid.set_coeffs(coeffs.mid);
        self.high_shelf.set_coeffs(coeffs.high_shelf);
        self.high_cut.configure(&coeffs.high_cut, coeffs.high_cut_slope);
    }

    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        let y = self.low_cut.process_sample(x);
        let y = self.low_shelf.process_sample(y);
        let y = self.low_mid.process_sample(y);
        let y = self.mid.process_sample(y);
        let y = self.high_shelf.process_sample(y);
        self.high_cut.process_sample(y)
    }

    /// Run every sample through the chain in place
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample as f64) as f32;
        }
    }

    pub fn reset(&mut self) {
        self.low_cut.reset();
        self.low_shelf.reset();
        self.low_mid.reset();
        self.mid.reset();
        self.high_shelf.reset();
        self.high_cut.reset();
    }

    pub fn low_cut(&self) -> &CutBank {
        &self.low_cut
    }

    pub fn high_cut(&self) -> &CutBank {
        &self.high_cut
    }

    /// Single-section stage at a position; `None` for the cut banks
    pub fn band(&self, position: ChainPosition) -> Option<&BiquadFilter> {
        match position {
            ChainPosition::LowShelf => Some(&self.low_shelf),
            ChainPosition::LowMidPeak => Some(&self.low_mid),
            ChainPosition::MidPeak => Some(&self.mid),
            ChainPosition::HighShelf => Some(&self.high_shelf),
            ChainPosition::LowCut | ChainPosition::HighCut => None,
        }
    }

    /// Response of the installed coefficients; bypassed stages count as unity
    pub fn response(&self, freq: f64, sample_rate: f64) -> Complex<f64> {
        self.low_cut.response(freq, sample_rate)
            * self.low_shelf.coeffs().response(freq, sample_rate)
            * self.low_mid.coeffs().response(freq, sample_rate)
            * self.mid.coeffs().response(freq, sample_rate)
            * self.high_shelf.coeffs().response(freq, sample_rate)
            * self.high_cut.response(freq, sample_rate)
    }

    pub fn magnitude_db(&self, freq: f64, sample_rate: f64) -> f64 {
        20.0 * self.response(freq, sample_rate).norm().max(1e-12).log10()
    }
}

// ============================================================================
// CHANNEL PROCESSOR
// ============================================================================

/// Drives one [`MonoChain`] over a channel's contiguous samples
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelProcessor {
    chain: MonoChain,
}

impl ChannelProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepare(&mut self, spec: &ProcessSpec) -> Result<()> {
        self.chain.prepare(spec)
    }

    pub fn update(&mut self, coeffs: &ChainCoefficients) {
        self.chain.update(coeffs);
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        self.chain.process(samples);
    }

    pub fn reset(&mut self) {
        self.chain.reset();
    }

    pub fn chain(&self) -> &MonoChain {
        &self.chain
    }
}

// ============================================================================
// BLOCK ORCHESTRATOR
// ============================================================================

/// Stereo parametric equalizer driven by a shared parameter store
///
/// Lifecycle: `prepare` → `process`* → `release`. Processing before
/// `prepare` returns [`AudioError::NotPrepared`].
pub struct ParametricEq {
    params: Arc<dyn ParameterStore>,
    left: ChannelProcessor,
    right: ChannelProcessor,
    spec: Option<ProcessSpec>,
    settings: ChainSettings,
    // Deinterleave buffers for `Effect::process`, sized at prepare
    scratch_left: Vec<f32>,
    scratch_right: Vec<f32>,
    bypass: bool,
}

impl fmt::Debug for ParametricEq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParametricEq")
            .field("spec", &self.spec)
            .field("settings", &self.settings)
            .field("bypass", &self.bypass)
            .finish_non_exhaustive()
    }
}

impl ParametricEq {
    pub fn new(params: Arc<dyn ParameterStore>) -> Self {
        Self {
            params,
            left: ChannelProcessor::new(),
            right: ChannelProcessor::new(),
            spec: None,
            settings: ChainSettings::default(),
            scratch_left: Vec::new(),
            scratch_right: Vec::new(),
            bypass: false,
        }
    }

    /// Prepare for playback
    ///
    /// Refuses non-positive sample rates, empty blocks and layouts other than
    /// mono or stereo. Clears all filter memory and installs coefficients for
    /// the current parameters.
    pub fn prepare(&mut self, spec: ProcessSpec) -> Result<()> {
        spec.validate()?;

        self.left.prepare(&spec)?;
        self.right.prepare(&spec)?;

        self.scratch_left = vec![0.0; spec.maximum_block_size];
        self.scratch_right = vec![0.0; spec.maximum_block_size];
        self.spec = Some(spec);
        self.refresh(spec.sample_rate);

        info!(
            sample_rate = spec.sample_rate,
            block_size = spec.maximum_block_size,
            channels = spec.num_channels,
            "Equalizer prepared"
        );
        Ok(())
    }

    /// Drop scratch memory and return to the not-prepared state
    pub fn release(&mut self) {
        self.spec = None;
        self.scratch_left = Vec::new();
        self.scratch_right = Vec::new();
        self.left.reset();
        self.right.reset();
        debug!("Equalizer released");
    }

    pub fn is_prepared(&self) -> bool {
        self.spec.is_some()
    }

    pub fn spec(&self) -> Option<&ProcessSpec> {
        self.spec.as_ref()
    }

    /// Settings snapshot used for the most recent block
    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    pub fn left(&self) -> &ChannelProcessor {
        &self.left
    }

    pub fn right(&self) -> &ChannelProcessor {
        &self.right
    }

    fn prepared_rate(&self) -> Result<f64> {
        self.spec
            .as_ref()
            .map(|spec| spec.sample_rate)
            .ok_or(AudioError::NotPrepared)
    }

    /// Snapshot parameters, design once, install on both channels
    fn refresh(&mut self, sample_rate: f64) {
        self.settings = self.params.snapshot();
        let coeffs = ChainCoefficients::design(&self.settings, sample_rate);
        self.left.update(&coeffs);
        self.right.update(&coeffs);
    }

    /// Process one stereo block in place
    ///
    /// Both slices must have the same length. An empty block is a no-op that
    /// leaves every filter untouched.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<()> {
        let sample_rate = self.prepared_rate()?;
        if left.len() != right.len() {
            return Err(AudioError::ChannelLengthMismatch {
                left: left.len(),
                right: right.len(),
            });
        }
        if left.is_empty() || self.bypass {
            return Ok(());
        }

        self.refresh(sample_rate);
        self.left.process(left);
        self.right.process(right);
        Ok(())
    }

    /// Process a mono block through the left chain
    pub fn process_mono(&mut self, samples: &mut [f32]) -> Result<()> {
        let sample_rate = self.prepared_rate()?;
        if samples.is_empty() || self.bypass {
            return Ok(());
        }

        self.refresh(sample_rate);
        self.left.process(samples);
        Ok(())
    }

    /// Process an interleaved buffer in chunks of at most the prepared block size
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) -> Result<()> {
        let spec = *self.spec.as_ref().ok_or(AudioError::NotPrepared)?;
        if spec.num_channels == 1 {
            return self.process_mono(buffer);
        }
        if buffer.len() % 2 != 0 {
            return Err(AudioError::ChannelLengthMismatch {
                left: buffer.len() / 2 + 1,
                right: buffer.len() / 2,
            });
        }

        // Moving the Vecs out keeps the borrow checker happy without reallocating
        let mut left = std::mem::take(&mut self.scratch_left);
        let mut right = std::mem::take(&mut self.scratch_right);

        let mut result = Ok(());
        for chunk in buffer.chunks_mut(spec.maximum_block_size * 2) {
            let frames = chunk.len() / 2;
            for (i, frame) in chunk.chunks_exact(2).enumerate() {
                left[i] = frame[0];
                right[i] = frame[1];
            }

            result = self.process(&mut left[..frames], &mut right[..frames]);
            if result.is_err() {
                break;
            }

            for (i, frame) in chunk.chunks_exact_mut(2).enumerate() {
                frame[0] = left[i];
                frame[1] = right[i];
            }
        }

        self.scratch_left = left;
        self.scratch_right = right;
        result
    }

    /// Analytic response of the installed coefficients (left channel)
    pub fn magnitude_db(&self, freq: f64) -> Result<f64> {
        let sample_rate = self.prepared_rate()?;
        Ok(self.left.chain().magnitude_db(freq, sample_rate))
    }
}

impl Effect for ParametricEq {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        self.process_interleaved(buffer)
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
        if bypass {
            self.reset();
        }
    }

    fn name(&self) -> &str {
        "ParametricEq"
    }
}
