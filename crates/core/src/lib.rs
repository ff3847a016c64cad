//! Sixband core: a six-stage stereo parametric equalizer
//!
//! The crate is split along the signal path:
//! - [`domain::params`]: the parameter store read by the audio thread
//! - [`domain::dsp`]: coefficient design, biquad stages and cut banks
//! - [`domain::equalizer`]: per-channel filter chains and the block orchestrator
//! - [`domain::config`]: TOML configuration and hot reload

pub mod domain;
