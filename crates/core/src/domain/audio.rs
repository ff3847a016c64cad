//! Audio stream and device abstractions
//!
//! This module defines the processing specification handed to the equalizer
//! at `prepare` time and the platform-agnostic device interfaces. Device
//! implementations (CPAL) live in the `infra` crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Invalid configuration handed to `prepare` or a stream
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Processing was requested before `prepare`
    #[error("Processor used before prepare")]
    NotPrepared,

    /// Left and right channel views differ in length
    #[error("Channel length mismatch: left={left}, right={right}")]
    ChannelLengthMismatch { left: usize, right: usize },

    /// Input/Output error at the OS level
    #[error("OS error: {0}")]
    OsError(String),

    /// Device does not support the requested configuration
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Unique identifier for an audio device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Audio sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz44100,
    Hz48000,
    Hz96000,
    Hz192000,
    Custom(u32),
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz96000 => 96000,
            SampleRate::Hz192000 => 192000,
            SampleRate::Custom(hz) => *hz,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        match hz {
            44100 => SampleRate::Hz44100,
            48000 => SampleRate::Hz48000,
            96000 => SampleRate::Hz96000,
            192000 => SampleRate::Hz192000,
            hz => SampleRate::Custom(hz),
        }
    }
}

/// Number of audio channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelCount {
    Mono,
    Stereo,
    Surround(u16),
}

impl ChannelCount {
    pub fn count(&self) -> u16 {
        match self {
            ChannelCount::Mono => 1,
            ChannelCount::Stereo => 2,
            ChannelCount::Surround(n) => *n,
        }
    }

    pub fn from_count(count: u16) -> Self {
        match count {
            1 => ChannelCount::Mono,
            2 => ChannelCount::Stereo,
            n => ChannelCount::Surround(n),
        }
    }
}

/// Configuration for an audio stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub sample_rate: SampleRate,
    pub channels: ChannelCount,
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            channels: ChannelCount::Stereo,
            buffer_size: 512,
        }
    }
}

/// Everything a processor needs to know before the first block
///
/// Handed to `prepare`. Only mono and stereo layouts are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub maximum_block_size: usize,
    pub num_channels: usize,
}

impl ProcessSpec {
    pub fn new(sample_rate: f64, maximum_block_size: usize, num_channels: usize) -> Self {
        Self {
            sample_rate,
            maximum_block_size,
            num_channels,
        }
    }

    /// Stereo spec, the layout the equalizer is built around
    pub fn stereo(sample_rate: f64, maximum_block_size: usize) -> Self {
        Self::new(sample_rate, maximum_block_size, 2)
    }

    /// Reject specs no processor can be prepared with
    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(AudioError::InvalidConfiguration(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.maximum_block_size == 0 {
            return Err(AudioError::InvalidConfiguration(
                "maximum block size must be at least one sample".to_string(),
            ));
        }
        if !(1..=2).contains(&self.num_channels) {
            return Err(AudioError::UnsupportedConfiguration(format!(
                "only mono or stereo layouts are supported, got {} channels",
                self.num_channels
            )));
        }
        Ok(())
    }
}

impl From<&StreamConfig> for ProcessSpec {
    fn from(config: &StreamConfig) -> Self {
        Self::new(
            config.sample_rate.hz() as f64,
            config.buffer_size as usize,
            config.channels.count() as usize,
        )
    }
}

/// Information about an output device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub sample_rates: Vec<SampleRate>,
    pub channel_counts: Vec<ChannelCount>,
    pub default_sample_rate: Option<SampleRate>,
}

/// Trait for platform-agnostic audio device operations
pub trait AudioDevice: Send + Sync {
    /// Get information about this device
    fn info(&self) -> &DeviceInfo;

    /// Check if the device supports a specific configuration
    fn supports_config(&self, config: &StreamConfig) -> bool;

    /// Get the default output configuration for this device
    fn default_config(&self) -> Result<StreamConfig>;
}

/// Trait for enumerating playback devices
pub trait AudioEnumerator: Send + Sync {
    /// List all available output devices
    fn output_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Get the default output device
    fn default_output_device(&self) -> Result<DeviceInfo>;

    /// Find an output device by its ID
    fn device_by_id(&self, id: &DeviceId) -> Result<DeviceInfo> {
        self.output_devices()?
            .into_iter()
            .find(|d| d.id == *id)
            .ok_or_else(|| AudioError::DeviceNotFound(id.as_str().to_string()))
    }
}
