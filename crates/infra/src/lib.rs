//! Sixband infrastructure: platform audio and measurement
//!
//! - [`audio`]: CPAL device enumeration and real-time playback through the EQ
//! - [`analyzer`]: FFT measurement of a prepared equalizer's response

pub mod analyzer;
pub mod audio;
