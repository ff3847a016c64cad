//! Platform-specific audio backend implementations using CPAL
//!
//! This module provides cross-platform playback through CPAL, which abstracts
//! platform-specific APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod cpal_backend;
pub mod signal;
pub mod stream;

pub use cpal_backend::{CpalDevice, CpalEnumerator};
pub use signal::SignalGenerator;
pub use stream::EqStream;
