//! CPAL-based audio device implementation
//!
//! Provides a cross-platform interface to playback devices using the CPAL library.

use cpal::traits::{DeviceTrait, HostTrait};
use sixband_core::domain::audio::{
    AudioDevice, AudioEnumerator, AudioError, ChannelCount, DeviceId, DeviceInfo, Result,
    SampleRate, StreamConfig,
};
use std::fmt;
use tracing::{debug, info, warn};

/// Block size asked for when the caller has no preference
const DEFAULT_BUFFER_FRAMES: u32 = 512;

/// Device name used as its identifier
#[allow(deprecated)]
pub(crate) fn device_name(device: &cpal::Device) -> String {
    device
        .name()
        .unwrap_or_else(|_| "Unknown Device".to_string())
}

/// Buffer size to request for `requested` frames
///
/// Fixed sizes are clamped to what the device reports. When the device does
/// not report a range, the host picks its own size.
pub(crate) fn buffer_size_for(
    requested: u32,
    supported: &cpal::SupportedBufferSize,
) -> cpal::BufferSize {
    match supported {
        cpal::SupportedBufferSize::Range { min, max } if min <= max => {
            cpal::BufferSize::Fixed(requested.clamp(*min, *max))
        }
        _ => cpal::BufferSize::Default,
    }
}

/// CPAL-based output device wrapper
pub struct CpalDevice {
    info: DeviceInfo,
    cpal_device: cpal::Device,
}

impl CpalDevice {
    pub fn new(cpal_device: cpal::Device) -> Result<Self> {
        let name = device_name(&cpal_device);

        let configs = cpal_device
            .supported_output_configs()
            .map_err(|e| AudioError::UnsupportedConfiguration(e.to_string()))?;

        let mut sample_rates = Vec::new();
        let mut channel_counts = Vec::new();
        for config in configs {
            for rate in [config.min_sample_rate(), config.max_sample_rate()] {
                sample_rates.push(SampleRate::from_hz(rate));
            }
            channel_counts.push(ChannelCount::from_count(config.channels()));
        }

        // Remove duplicates
        sample_rates.sort_by_key(|sr| sr.hz());
        sample_rates.dedup_by_key(|sr| sr.hz());
        channel_counts.sort_by_key(|cc| cc.count());
        channel_counts.dedup_by_key(|cc| cc.count());

        let default_sample_rate = cpal_device
            .default_output_config()
            .ok()
            .map(|config| SampleRate::from_hz(config.sample_rate()));

        let info = DeviceInfo {
            id: DeviceId::new(name.clone()),
            name,
            sample_rates,
            channel_counts,
            default_sample_rate,
        };

        debug!("Created device: {}", info.name);

        Ok(Self { info, cpal_device })
    }

    pub fn cpal_device(&self) -> &cpal::Device {
        &self.cpal_device
    }

    /// First supported range covering the config's rate and channel count
    fn matching_range(&self, config: &StreamConfig) -> Option<cpal::SupportedStreamConfigRange> {
        let rate = config.sample_rate.hz();
        let channels = config.channels.count();

        self.cpal_device
            .supported_output_configs()
            .ok()?
            .find(|c| {
                c.channels() == channels
                    && c.min_sample_rate() <= rate
                    && rate <= c.max_sample_rate()
            })
    }

    /// Buffer size to request when opening a stream with `config`
    pub fn buffer_size(&self, config: &StreamConfig) -> cpal::BufferSize {
        self.matching_range(config)
            .map_or(cpal::BufferSize::Default, |range| {
                buffer_size_for(config.buffer_size, range.buffer_size())
            })
    }
}

impl AudioDevice for CpalDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn supports_config(&self, config: &StreamConfig) -> bool {
        // Checked against the full supported ranges, not just their endpoints
        self.matching_range(config).is_some()
    }

    fn default_config(&self) -> Result<StreamConfig> {
        let cpal_config = self
            .cpal_device
            .default_output_config()
            .map_err(|e| AudioError::InvalidConfiguration(e.to_string()))?;

        let buffer_size =
            match buffer_size_for(DEFAULT_BUFFER_FRAMES, cpal_config.buffer_size()) {
                cpal::BufferSize::Fixed(frames) => frames,
                _ => DEFAULT_BUFFER_FRAMES,
            };

        Ok(StreamConfig {
            sample_rate: SampleRate::from_hz(cpal_config.sample_rate()),
            channels: ChannelCount::from_count(cpal_config.channels()),
            buffer_size,
        })
    }
}

impl fmt::Debug for CpalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalDevice")
            .field("info", &self.info)
            .finish()
    }
}

/// CPAL-based output device enumerator
pub struct CpalEnumerator {
    host: cpal::Host,
}

impl Default for CpalEnumerator {
    fn default() -> Self {
        info!("Initializing CPAL enumerator");
        Self::new()
    }
}

impl CpalEnumerator {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());
        Self { host }
    }

    /// Resolve an output device by ID, or the default output when `None`
    pub fn output_device(&self, id: Option<&DeviceId>) -> Result<cpal::Device> {
        match id {
            Some(id) => self
                .host
                .output_devices()
                .map_err(|e| AudioError::OsError(e.to_string()))?
                .find(|d| device_name(d) == id.as_str())
                .ok_or_else(|| AudioError::DeviceNotFound(id.as_str().to_string())),
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
        }
    }
}

impl AudioEnumerator for CpalEnumerator {
    fn output_devices(&self) -> Result<Vec<DeviceInfo>> {
        info!("Enumerating output devices");

        let cpal_devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        let mut devices = Vec::new();
        for device in cpal_devices {
            match CpalDevice::new(device) {
                Ok(cp_device) => {
                    debug!("Found device: {}", cp_device.info().name);
                    devices.push(cp_device.info().clone());
                }
                Err(e) => {
                    warn!("Skipping device due to error: {}", e);
                }
            }
        }

        info!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn default_output_device(&self) -> Result<DeviceInfo> {
        CpalDevice::new(self.output_device(None)?).map(|d| d.info().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerator_creation() {
        let enumerator = CpalEnumerator::default();
        assert_eq!(enumerator.host.id(), cpal::default_host().id());
    }

    #[test]
    fn test_enumerate_output_devices() {
        let enumerator = CpalEnumerator::default();
        match enumerator.output_devices() {
            Ok(devices) => {
                for device in &devices {
                    assert!(!device.name.is_empty());
                }
            }
            Err(e) => {
                // On CI or headless systems, there might not be audio devices
                eprintln!("Skipping test: {}", e);
            }
        }
    }

    #[test]
    fn test_default_output_device() {
        let enumerator = CpalEnumerator::default();

        match enumerator.default_output_device() {
            Ok(output) => {
                assert!(!output.name.is_empty());
                if let Ok(found) = enumerator.device_by_id(&output.id) {
                    assert_eq!(found.name, output.name);
                }
            }
            Err(e) => {
                eprintln!("Skipping test: {}", e);
            }
        }
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let enumerator = CpalEnumerator::default();
        let id = DeviceId::new("sixband-no-such-device".to_string());

        match enumerator.output_device(Some(&id)) {
            Err(AudioError::DeviceNotFound(name)) => assert_eq!(name, id.as_str()),
            Err(e) => eprintln!("Skipping test: {}", e),
            Ok(_) => panic!("unexpected device match"),
        }
    }

    #[test]
    fn test_buffer_size_is_clamped_to_device_range() {
        let range = cpal::SupportedBufferSize::Range { min: 64, max: 1024 };

        assert!(matches!(buffer_size_for(512, &range), cpal::BufferSize::Fixed(512)));
        assert!(matches!(buffer_size_for(16, &range), cpal::BufferSize::Fixed(64)));
        assert!(matches!(buffer_size_for(4096, &range), cpal::BufferSize::Fixed(1024)));
    }

    #[test]
    fn test_unknown_buffer_range_lets_host_choose() {
        assert!(matches!(
            buffer_size_for(512, &cpal::SupportedBufferSize::Unknown),
            cpal::BufferSize::Default
        ));
    }

    #[test]
    fn test_default_config_is_supported() {
        let enumerator = CpalEnumerator::default();
        let device = match enumerator.output_device(None).and_then(CpalDevice::new) {
            Ok(device) => device,
            Err(e) => {
                eprintln!("Skipping test: {}", e);
                return;
            }
        };

        match device.default_config() {
            Ok(config) => {
                assert!(config.buffer_size > 0);
                assert!(device.supports_config(&config));
                assert!(!matches!(
                    device.buffer_size(&config),
                    cpal::BufferSize::Fixed(0)
                ));
            }
            Err(e) => eprintln!("Skipping test: {}", e),
        }
    }

    #[test]
    fn test_absurd_config_is_unsupported() {
        let enumerator = CpalEnumerator::default();
        let Ok(device) = enumerator.output_device(None).and_then(CpalDevice::new) else {
            eprintln!("Skipping test: no default output device");
            return;
        };

        let config = StreamConfig {
            sample_rate: SampleRate::Custom(1),
            channels: ChannelCount::Stereo,
            buffer_size: 512,
        };
        assert!(!device.supports_config(&config));
        assert!(matches!(device.buffer_size(&config), cpal::BufferSize::Default));
    }
}
