//! Real-time playback through the equalizer
//!
//! The output callback renders a test signal, runs it through a
//! [`ParametricEq`] and hands the result to the device. Parameters are read
//! from a shared store, so another thread can reshape the curve while playing.

use super::cpal_backend::{CpalDevice, CpalEnumerator};
use super::signal::SignalGenerator;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig as CpalStreamConfig};
use crossbeam::channel::{bounded, Receiver};
use sixband_core::domain::audio::{
    AudioDevice, AudioError, DeviceId, ProcessSpec, Result, StreamConfig,
};
use sixband_core::domain::{Effect, ParameterStore, ParametricEq};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Stream errors reported by the device, kept until drained
const ERROR_QUEUE: usize = 16;

/// A running output stream with the equalizer in its callback
pub struct EqStream {
    _stream: Stream,
    config: StreamConfig,
    bypass: Arc<AtomicBool>,
    errors: Receiver<String>,
}

impl EqStream {
    /// Open and start playback on `device_id` (or the default output)
    ///
    /// Without a `config`, the device's default configuration is used. A
    /// config the device cannot play is refused before any stream is built.
    pub fn open(
        enumerator: &CpalEnumerator,
        device_id: Option<&DeviceId>,
        config: Option<&StreamConfig>,
        params: Arc<dyn ParameterStore>,
        mut generator: SignalGenerator,
    ) -> Result<Self> {
        let device = CpalDevice::new(enumerator.output_device(device_id)?)?;
        let mut config = match config {
            Some(config) => config.clone(),
            None => device.default_config()?,
        };

        info!(
            device = %device.info().name,
            "Creating output stream: config={:?}",
            config
        );

        if !device.supports_config(&config) {
            return Err(AudioError::UnsupportedConfiguration(format!(
                "{} cannot play {} Hz with {} channels",
                device.info().name,
                config.sample_rate.hz(),
                config.channels.count()
            )));
        }

        // Callback sizes may differ from the request; processing is chunked
        let buffer_size = device.buffer_size(&config);
        if let cpal::BufferSize::Fixed(frames) = buffer_size {
            config.buffer_size = frames;
        }

        let spec = ProcessSpec::from(&config);
        let mut eq = ParametricEq::new(params);
        eq.prepare(spec)?;

        let channels = spec.num_channels;
        let bypass = Arc::new(AtomicBool::new(false));
        let bypass_flag = Arc::clone(&bypass);
        let (error_tx, errors) = bounded(ERROR_QUEUE);

        let cpal_config = CpalStreamConfig {
            channels: config.channels.count(),
            sample_rate: config.sample_rate.hz(),
            buffer_size,
        };

        let stream = device
            .cpal_device()
            .build_output_stream(
                &cpal_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    generator.fill_interleaved(data, channels);

                    let bypassed = bypass_flag.load(Ordering::Relaxed);
                    if bypassed != eq.is_bypassed() {
                        eq.set_bypass(bypassed);
                    }

                    // Only host misuse can fail here; play silence rather than raw signal
                    if eq.process_interleaved(data).is_err() {
                        data.fill(0.0);
                    }
                },
                move |err| {
                    error!("Output stream error: {}", err);
                    let _ = error_tx.try_send(err.to_string());
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))?;

        info!(buffer_size = config.buffer_size, "Output stream started");

        Ok(Self {
            _stream: stream,
            config,
            bypass,
            errors,
        })
    }

    /// Get stream configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Engage or release the equalizer's global bypass
    pub fn set_bypass(&self, bypass: bool) {
        self.bypass.store(bypass, Ordering::Relaxed);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::Relaxed)
    }

    /// Drain errors reported by the device since the last call
    pub fn take_errors(&self) -> Vec<String> {
        self.errors.try_iter().collect()
    }
}

impl Drop for EqStream {
    fn drop(&mut self) {
        info!("Output stream stopped");
    }
}
