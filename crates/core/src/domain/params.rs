//! Parameter identities, ranges and the lock-free parameter store
//!
//! The control side writes parameters through [`AtomicParameterStore`]; the
//! audio thread reads a consistent [`ChainSettings`] once per block through the
//! [`ParameterStore`] trait. Neither side blocks or allocates.

use crate::domain::dsp::Slope;
use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};
use thiserror::Error;

/// Errors raised when writing or looking up parameters
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Parameter {id} rejected non-finite value {value}")]
    NotFinite { id: ParamId, value: f32 },
}

pub type Result<T> = std::result::Result<T, ParamError>;

/// Host-facing parameter ranges
pub mod ranges {
    pub const FREQ_MIN: f32 = 20.0;
    pub const FREQ_MAX: f32 = 20000.0;
    pub const FREQ_STEP: f32 = 1.0;

    pub const GAIN_MIN: f32 = -24.0;
    pub const GAIN_MAX: f32 = 24.0;
    pub const GAIN_STEP: f32 = 0.5;

    pub const Q_MIN: f32 = 0.1;
    pub const Q_MAX: f32 = 10.0;
    pub const Q_STEP: f32 = 0.05;
    pub const Q_DEFAULT: f32 = 1.0;

    /// Slope choices 0..=3 (12/24/36/48 dB/oct)
    pub const SLOPE_MAX: f32 = 3.0;
}

// ============================================================================
// PARAMETER RANGE
// ============================================================================

/// A continuous range with step snapping and a skewed normalized mapping
///
/// `to_normalized(v) = ((v - min) / (max - min)) ^ skew`, so a skew below 1
/// gives more of the 0..1 travel to the low end of the range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub skew: f32,
    pub default: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32, step: f32, skew: f32, default: f32) -> Self {
        Self {
            min,
            max,
            step,
            skew,
            default,
        }
    }

    /// Clamp into the range and snap to the nearest step
    pub fn clamp_and_snap(&self, value: f32) -> f32 {
        let value = value.clamp(self.min, self.max);
        if self.step > 0.0 {
            let snapped = self.min + ((value - self.min) / self.step).round() * self.step;
            snapped.clamp(self.min, self.max)
        } else {
            value
        }
    }

    pub fn to_normalized(&self, value: f32) -> f32 {
        let proportion = (value.clamp(self.min, self.max) - self.min) / (self.max - self.min);
        if self.skew == 1.0 {
            proportion
        } else {
            proportion.powf(self.skew)
        }
    }

    pub fn from_normalized(&self, normalized: f32) -> f32 {
        let mut proportion = normalized.clamp(0.0, 1.0);
        if self.skew != 1.0 && proportion > 0.0 {
            proportion = (proportion.ln() / self.skew).exp();
        }
        self.clamp_and_snap(self.min + (self.max - self.min) * proportion)
    }

    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

// ============================================================================
// PARAMETER IDENTITIES
// ============================================================================

/// Every automatable parameter of the equalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamId {
    LowCutFreq,
    LowCutSlope,
    LowShelfFreq,
    LowShelfGain,
    LowShelfQ,
    LowMidFreq,
    LowMidGain,
    LowMidQ,
    MidFreq,
    MidGain,
    MidQ,
    HighShelfFreq,
    HighShelfGain,
    HighShelfQ,
    HighCutFreq,
    HighCutSlope,
}

impl ParamId {
    pub const COUNT: usize = 16;

    pub const ALL: [ParamId; Self::COUNT] = [
        ParamId::LowCutFreq,
        ParamId::LowCutSlope,
        ParamId::LowShelfFreq,
        ParamId::LowShelfGain,
        ParamId::LowShelfQ,
        ParamId::LowMidFreq,
        ParamId::LowMidGain,
        ParamId::LowMidQ,
        ParamId::MidFreq,
        ParamId::MidGain,
        ParamId::MidQ,
        ParamId::HighShelfFreq,
        ParamId::HighShelfGain,
        ParamId::HighShelfQ,
        ParamId::HighCutFreq,
        ParamId::HighCutSlope,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable identifier used by hosts and config files
    pub fn id(self) -> &'static str {
        match self {
            ParamId::LowCutFreq => "LOWCUTFREQ",
            ParamId::LowCutSlope => "LOWCUTSLOPE",
            ParamId::LowShelfFreq => "LOWSHELFFREQ",
            ParamId::LowShelfGain => "LOWSHELFGAIN",
            ParamId::LowShelfQ => "LOWSHELFQ",
            ParamId::LowMidFreq => "LOWMIDPEAKFREQ",
            ParamId::LowMidGain => "LOWMIDPEAKGAIN",
            ParamId::LowMidQ => "LOWMIDPEAKQ",
            ParamId::MidFreq => "MIDPEAKFREQ",
            ParamId::MidGain => "MIDPEAKGAIN",
            ParamId::MidQ => "MIDPEAKQ",
            ParamId::HighShelfFreq => "HISHELFFREQ",
            ParamId::HighShelfGain => "HISHELFGAIN",
            ParamId::HighShelfQ => "HISHELFQ",
            ParamId::HighCutFreq => "HICUTFREQ",
            ParamId::HighCutSlope => "HICUTSLOPE",
        }
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            ParamId::LowCutFreq => "Low Cut Freq",
            ParamId::LowCutSlope => "Low Cut Slope",
            ParamId::LowShelfFreq => "Low Shelf Freq",
            ParamId::LowShelfGain => "Low Shelf Gain",
            ParamId::LowShelfQ => "Low Shelf Q",
            ParamId::LowMidFreq => "Low Mid Peak Freq",
            ParamId::LowMidGain => "Low Mid Gain",
            ParamId::LowMidQ => "Low Mid Q",
            ParamId::MidFreq => "Mid Peak Freq",
            ParamId::MidGain => "Mid Gain",
            ParamId::MidQ => "Mid Q",
            ParamId::HighShelfFreq => "Hi Shelf Freq",
            ParamId::HighShelfGain => "Hi Shelf Gain",
            ParamId::HighShelfQ => "Hi Shelf Q",
            ParamId::HighCutFreq => "Hi Cut Freq",
            ParamId::HighCutSlope => "Hi Cut Slope",
        }
    }

    pub fn unit(self) -> &'static str {
        if self.is_choice() {
            ""
        } else if self.id().ends_with("FREQ") {
            "Hz"
        } else if self.id().ends_with("GAIN") {
            "dB"
        } else {
            ""
        }
    }

    /// Slope parameters are discrete choices rather than continuous values
    pub fn is_choice(self) -> bool {
        matches!(self, ParamId::LowCutSlope | ParamId::HighCutSlope)
    }

    pub fn range(self) -> ParamRange {
        use ranges::*;

        let freq = |skew, default| ParamRange::new(FREQ_MIN, FREQ_MAX, FREQ_STEP, skew, default);
        let gain = ParamRange::new(GAIN_MIN, GAIN_MAX, GAIN_STEP, 1.0, 0.0);
        let q = ParamRange::new(Q_MIN, Q_MAX, Q_STEP, 1.0, Q_DEFAULT);
        let slope = ParamRange::new(0.0, SLOPE_MAX, 1.0, 1.0, 0.0);

        match self {
            ParamId::LowCutFreq => freq(1.0, FREQ_MIN),
            ParamId::LowShelfFreq => freq(0.3, 150.0),
            ParamId::LowMidFreq => freq(0.3, 750.0),
            ParamId::MidFreq => freq(0.4, 3000.0),
            ParamId::HighShelfFreq => freq(0.4, 8000.0),
            ParamId::HighCutFreq => freq(1.0, FREQ_MAX),
            ParamId::LowShelfGain
            | ParamId::LowMidGain
            | ParamId::MidGain
            | ParamId::HighShelfGain => gain,
            ParamId::LowShelfQ | ParamId::LowMidQ | ParamId::MidQ | ParamId::HighShelfQ => q,
            ParamId::LowCutSlope | ParamId::HighCutSlope => slope,
        }
    }

    pub fn default_value(self) -> f32 {
        self.range().default
    }

    /// Choice labels for slope parameters, empty for continuous ones
    pub fn choices(self) -> &'static [&'static str] {
        const LABELS: [&str; 4] = [
            "12 db/Octave",
            "24 db/Octave",
            "36 db/Octave",
            "48 db/Octave",
        ];
        if self.is_choice() {
            &LABELS
        } else {
            &[]
        }
    }

    /// Look up a parameter by identifier (case-insensitive)
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(id.trim()))
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ParamId {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_id(s).ok_or_else(|| ParamError::UnknownParameter(s.to_string()))
    }
}

// ============================================================================
// SETTINGS SNAPSHOT
// ============================================================================

/// Shelf or peak band settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSettings {
    pub frequency: f32,
    pub gain_db: f32,
    pub q: f32,
}

/// Cut filter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutSettings {
    pub frequency: f32,
    pub slope: Slope,
}

/// One consistent view of every parameter, taken once per block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainSettings {
    pub low_cut: CutSettings,
    pub low_shelf: BandSettings,
    pub low_mid: BandSettings,
    pub mid: BandSettings,
    pub high_shelf: BandSettings,
    pub high_cut: CutSettings,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self::read_from(ParamId::default_value)
    }
}

impl ChainSettings {
    /// Build settings from a per-parameter reader
    pub fn read_from(read: impl Fn(ParamId) -> f32) -> Self {
        let band = |freq, gain, q| BandSettings {
            frequency: read(freq),
            gain_db: read(gain),
            q: read(q),
        };

        Self {
            low_cut: CutSettings {
                frequency: read(ParamId::LowCutFreq),
                slope: Slope::from_choice(read(ParamId::LowCutSlope)),
            },
            low_shelf: band(ParamId::LowShelfFreq, ParamId::LowShelfGain, ParamId::LowShelfQ),
            low_mid: band(ParamId::LowMidFreq, ParamId::LowMidGain, ParamId::LowMidQ),
            mid: band(ParamId::MidFreq, ParamId::MidGain, ParamId::MidQ),
            high_shelf: band(
                ParamId::HighShelfFreq,
                ParamId::HighShelfGain,
                ParamId::HighShelfQ,
            ),
            high_cut: CutSettings {
                frequency: read(ParamId::HighCutFreq),
                slope: Slope::from_choice(read(ParamId::HighCutSlope)),
            },
        }
    }

    /// Value of a single parameter in this snapshot
    pub fn value(&self, id: ParamId) -> f32 {
        match id {
            ParamId::LowCutFreq => self.low_cut.frequency,
            ParamId::LowCutSlope => self.low_cut.slope.index() as f32,
            ParamId::LowShelfFreq => self.low_shelf.frequency,
            ParamId::LowShelfGain => self.low_shelf.gain_db,
            ParamId::LowShelfQ => self.low_shelf.q,
            ParamId::LowMidFreq => self.low_mid.frequency,
            ParamId::LowMidGain => self.low_mid.gain_db,
            ParamId::LowMidQ => self.low_mid.q,
            ParamId::MidFreq => self.mid.frequency,
            ParamId::MidGain => self.mid.gain_db,
            ParamId::MidQ => self.mid.q,
            ParamId::HighShelfFreq => self.high_shelf.frequency,
            ParamId::HighShelfGain => self.high_shelf.gain_db,
            ParamId::HighShelfQ => self.high_shelf.q,
            ParamId::HighCutFreq => self.high_cut.frequency,
            ParamId::HighCutSlope => self.high_cut.slope.index() as f32,
        }
    }
}

// ============================================================================
// PARAMETER STORE
// ============================================================================

/// Read side of the parameter store, as seen by the audio thread
///
/// Implementations must not block or allocate in `value` or `snapshot`.
pub trait ParameterStore: Send + Sync {
    /// Current value of one parameter
    fn value(&self, id: ParamId) -> f32;

    /// Look a parameter up by its string identifier
    fn value_by_name(&self, name: &str) -> Result<f32> {
        let id: ParamId = name.parse()?;
        Ok(self.value(id))
    }

    /// Read every parameter into one settings record
    fn snapshot(&self) -> ChainSettings {
        ChainSettings::read_from(|id| self.value(id))
    }
}

/// How many times a snapshot retries while a write is in flight
const SNAPSHOT_RETRIES: usize = 8;

/// Lock-free parameter store backed by one atomic per parameter
///
/// Values are stored as f32 bit patterns. A generation counter, odd while a
/// write is in progress, lets `snapshot` detect and retry torn reads. After
/// [`SNAPSHOT_RETRIES`] failed attempts the snapshot accepts the mixed read:
/// every individual value is still a complete, in-range f32.
///
/// Intended for a single writer (the control thread).
pub struct AtomicParameterStore {
    values: [CachePadded<AtomicU32>; ParamId::COUNT],
    generation: CachePadded<AtomicU64>,
}

impl Default for AtomicParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AtomicParameterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for id in ParamId::ALL {
            map.entry(&id.id(), &self.value(id));
        }
        map.finish()
    }
}

impl AtomicParameterStore {
    /// Create a store holding every parameter's default
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|i| {
                CachePadded::new(AtomicU32::new(ParamId::ALL[i].default_value().to_bits()))
            }),
            generation: CachePadded::new(AtomicU64::new(0)),
        }
    }

    fn begin_write(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::Release);
    }

    fn end_write(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    fn store(&self, id: ParamId, value: f32) {
        self.values[id.index()].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Set a parameter in its natural unit
    ///
    /// The value is clamped and snapped to the parameter's range; the stored
    /// value is returned. Non-finite values are rejected.
    pub fn set(&self, id: ParamId, value: f32) -> Result<f32> {
        if !value.is_finite() {
            return Err(ParamError::NotFinite { id, value });
        }
        let value = id.range().clamp_and_snap(value);

        self.begin_write();
        self.store(id, value);
        self.end_write();

        Ok(value)
    }

    /// Set a parameter from its 0..1 normalized position
    pub fn set_normalized(&self, id: ParamId, normalized: f32) -> Result<f32> {
        if !normalized.is_finite() {
            return Err(ParamError::NotFinite {
                id,
                value: normalized,
            });
        }
        self.set(id, id.range().from_normalized(normalized))
    }

    /// Current normalized position of a parameter
    pub fn normalized(&self, id: ParamId) -> f32 {
        id.range().to_normalized(self.value(id))
    }

    /// Set several parameters as one write
    ///
    /// All values are validated first; on error nothing is stored. Returns the
    /// number of parameters written.
    pub fn apply<I>(&self, changes: I) -> Result<usize>
    where
        I: IntoIterator<Item = (ParamId, f32)>,
    {
        let mut pending = [None; ParamId::COUNT];
        for (id, value) in changes {
            if !value.is_finite() {
                return Err(ParamError::NotFinite { id, value });
            }
            pending[id.index()] = Some(id.range().clamp_and_snap(value));
        }

        self.begin_write();
        let mut written = 0;
        for (id, value) in ParamId::ALL.into_iter().zip(pending) {
            if let Some(value) = value {
                self.store(id, value);
                written += 1;
            }
        }
        self.end_write();

        Ok(written)
    }

    /// Restore every parameter to its default
    pub fn reset_to_defaults(&self) {
        self.begin_write();
        for id in ParamId::ALL {
            self.store(id, id.default_value());
        }
        self.end_write();
    }

    /// Number of completed writes times two
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl ParameterStore for AtomicParameterStore {
    fn value(&self, id: ParamId) -> f32 {
        f32::from_bits(self.values[id.index()].load(Ordering::Relaxed))
    }

    fn snapshot(&self) -> ChainSettings {
        for _ in 0..SNAPSHOT_RETRIES {
            let before = self.generation.load(Ordering::Acquire);
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let settings = ChainSettings::read_from(|id| self.value(id));

            fence(Ordering::Acquire);
            if self.generation.load(Ordering::Relaxed) == before {
                return settings;
            }
        }

        ChainSettings::read_from(|id| self.value(id))
    }
}
