//! Variable-order cut banks
//!
//! A cut bank is four biquad stages in series. The slope decides how many of
//! them run; the rest are bypassed and hold cleared state.

use super::{BiquadCoeffs, BiquadFilter, CutCoeffs, MAX_CUT_SECTIONS};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Steepness of a cut filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Slope {
    #[default]
    Db12,
    Db24,
    Db36,
    Db48,
}

impl Slope {
    pub const ALL: [Slope; 4] = [Slope::Db12, Slope::Db24, Slope::Db36, Slope::Db48];

    /// Choice index (0..=3)
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Interpret a stored choice value, rounding and clamping to a valid slope
    pub fn from_choice(value: f32) -> Self {
        let index = if value.is_finite() {
            value.round().clamp(0.0, 3.0) as usize
        } else {
            0
        };
        Self::ALL[index]
    }

    /// Number of active second-order stages
    pub fn sections(self) -> usize {
        self.index() + 1
    }

    /// Butterworth order realized by this slope
    pub fn order(self) -> usize {
        2 * self.sections()
    }

    pub fn db_per_octave(self) -> u32 {
        12 * self.sections() as u32
    }

    /// Host-facing choice label
    pub fn label(self) -> &'static str {
        match self {
            Slope::Db12 => "12 db/Octave",
            Slope::Db24 => "24 db/Octave",
            Slope::Db36 => "36 db/Octave",
            Slope::Db48 => "48 db/Octave",
        }
    }
}

impl fmt::Display for Slope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CutStage {
    filter: BiquadFilter,
    bypassed: bool,
}

/// Four cascaded stages plus their bypass flags
#[derive(Debug, Clone, PartialEq)]
pub struct CutBank {
    stages: [CutStage; MAX_CUT_SECTIONS],
}

impl Default for CutBank {
    fn default() -> Self {
        Self::new()
    }
}

impl CutBank {
    /// New bank in the default 12 dB/oct layout with identity coefficients
    pub fn new() -> Self {
        let mut bank = Self {
            stages: std::array::from_fn(|_| CutStage {
                filter: BiquadFilter::bypass(),
                bypassed: true,
            }),
        };
        bank.configure(&CutCoeffs::default(), Slope::default());
        bank
    }

    /// Bind a design to the bank for the given slope
    ///
    /// Stages `0..slope.sections()` take the matching design entry and run;
    /// the remaining stages are bypassed. A stage that goes from active to
    /// bypassed has its memory cleared, so re-enabling it later starts from
    /// silence. Active stages keep their memory across calls.
    pub fn configure(&mut self, coeffs: &CutCoeffs, slope: Slope) {
        let active = slope.sections();
        let mut bypassed = [true; MAX_CUT_SECTIONS];
        bypassed[..active].fill(false);

        for (index, (stage, bypass)) in self.stages.iter_mut().zip(bypassed).enumerate() {
            if bypass {
                if !stage.bypassed {
                    stage.filter.reset();
                }
                stage.filter.set_coeffs(BiquadCoeffs::IDENTITY);
            } else {
                stage.filter.set_coeffs(coeffs.get(index));
            }
            stage.bypassed = bypass;
        }
    }

    /// Number of stages currently running
    pub fn active_stages(&self) -> usize {
        self.stages.iter().filter(|s| !s.bypassed).count()
    }

    pub fn is_bypassed(&self, stage: usize) -> bool {
        self.stages.get(stage).map_or(true, |s| s.bypassed)
    }

    pub fn stage(&self, stage: usize) -> Option<&BiquadFilter> {
        self.stages.get(stage).map(|s| &s.filter)
    }

    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        let mut y = x;
        for stage in self.stages.iter_mut().filter(|s| !s.bypassed) {
            y = stage.filter.process_sample(y);
        }
        y
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.filter.reset();
        }
    }

    /// Combined response of the active stages
    pub fn response(&self, freq: f64, sample_rate: f64) -> Complex<f64> {
        self.stages
            .iter()
            .filter(|s| !s.bypassed)
            .map(|s| s.filter.coeffs().response(freq, sample_rate))
            .product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::{butterworth, PassType};

    const SAMPLE_RATE: f64 = 48000.0;

    fn design(slope: Slope) -> CutCoeffs {
        butterworth(PassType::Highpass, SAMPLE_RATE, 200.0, slope.order())
    }

    fn drive(bank: &mut CutBank, samples: usize) {
        for i in 0..samples {
            let x = (i as f64 * 0.05).sin();
            bank.process_sample(x);
        }
    }

    #[test]
    fn test_slope_properties() {
        assert_eq!(Slope::Db12.sections(), 1);
        assert_eq!(Slope::Db48.sections(), 4);
        assert_eq!(Slope::Db36.order(), 6);
        assert_eq!(Slope::Db24.db_per_octave(), 24);
        assert_eq!(Slope::Db36.to_string(), "36 db/Octave");
        assert_eq!(Slope::from_index(4), None);
    }

    #[test]
    fn test_slope_from_choice() {
        assert_eq!(Slope::from_choice(0.0), Slope::Db12);
        assert_eq!(Slope::from_choice(1.4), Slope::Db24);
        assert_eq!(Slope::from_choice(2.6), Slope::Db48);
        assert_eq!(Slope::from_choice(9.0), Slope::Db48);
        assert_eq!(Slope::from_choice(-3.0), Slope::Db12);
        assert_eq!(Slope::from_choice(f32::NAN), Slope::Db12);
    }

    #[test]
    fn test_active_stage_count_per_slope() {
        let mut bank = CutBank::new();
        for slope in Slope::ALL {
            bank.configure(&design(slope), slope);
            assert_eq!(bank.active_stages(), slope.sections());
            for stage in 0..MAX_CUT_SECTIONS {
                assert_eq!(bank.is_bypassed(stage), stage >= slope.sections());
            }
        }
    }

    #[test]
    fn test_active_stages_take_design_entries() {
        let mut bank = CutBank::new();
        let coeffs = design(Slope::Db36);
        bank.configure(&coeffs, Slope::Db36);

        for (index, section) in coeffs.sections().iter().enumerate() {
            assert_eq!(bank.stage(index).map(|s| *s.coeffs()), Some(*section));
        }
    }

    #[test]
    fn test_reducing_slope_clears_dropped_stages() {
        let mut bank = CutBank::new();
        bank.configure(&design(Slope::Db48), Slope::Db48);
        drive(&mut bank, 256);
        assert!((0..4).all(|i| !bank.stage(i).is_some_and(|s| s.is_cleared())));

        bank.configure(&design(Slope::Db12), Slope::Db12);

        assert!(!bank.stage(0).is_some_and(|s| s.is_cleared()));
        for stage in 1..4 {
            assert!(bank.stage(stage).is_some_and(|s| s.is_cleared()));
        }
    }

    #[test]
    fn test_bypassed_stages_do_not_process() {
        let mut bank = CutBank::new();
        bank.configure(&design(Slope::Db24), Slope::Db24);
        drive(&mut bank, 128);

        assert!(bank.stage(2).is_some_and(|s| s.is_cleared()));
        assert!(bank.stage(3).is_some_and(|s| s.is_cleared()));
    }

    #[test]
    fn test_reconfigure_keeps_active_memory() {
        let mut bank = CutBank::new();
        bank.configure(&design(Slope::Db24), Slope::Db24);
        drive(&mut bank, 128);
        let before = bank.stage(0).map(|s| s.state());

        let moved = butterworth(PassType::Highpass, SAMPLE_RATE, 400.0, 4);
        bank.configure(&moved, Slope::Db24);

        assert_eq!(bank.stage(0).map(|s| s.state()), before);
    }

    #[test]
    fn test_response_matches_design() {
        let mut bank = CutBank::new();
        let coeffs = design(Slope::Db48);
        bank.configure(&coeffs, Slope::Db48);

        let db = 20.0 * bank.response(200.0, SAMPLE_RATE).norm().log10();
        assert!((db + 3.0103).abs() < 0.01);
    }
}
