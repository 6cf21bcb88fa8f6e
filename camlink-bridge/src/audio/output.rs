//! Audio output using cpal
//!
//! Hardware backend: opens a callback-driven cpal stream on the selected
//! device and lets the [`OutputNode`] fill every buffer the device asks for.
//!
//! Device selection falls back to the default output device when the
//! requested name is not found. Sample formats are preferred in the order
//! F32 → I16 → U16; integer streams are converted from a scratch buffer
//! allocated when the stream is built.

use crate::audio::backend::{OutputBackend, OutputGraph};
use crate::audio::types::OutputFormat;
use crate::error::{Error, Result};
use crate::playback::output_node::OutputNode;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const PREFERRED_FORMATS: [SampleFormat; 3] = [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16];

/// Device chosen by the last successful `configure`
struct ConfiguredDevice {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

/// cpal-backed output
pub struct CpalBackend {
    /// Requested device name (None = default)
    requested_device: Option<String>,
    configured: Option<ConfiguredDevice>,
    /// Stream errors reported across all graphs opened by this backend
    error_count: Arc<AtomicU32>,
}

impl CpalBackend {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            requested_device: device_name,
            configured: None,
            error_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::SessionConfigFailed(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn find_device(&self) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(name) = self.requested_device.as_ref() {
            let mut devices = host.output_devices().map_err(|e| {
                Error::SessionConfigFailed(format!("Failed to enumerate devices: {}", e))
            })?;

            if let Some(dev) = devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                info!("Found requested audio device: {}", name);
                return Ok(dev);
            }

            warn!("Requested device '{}' not found, falling back to default device", name);
        }

        let dev = host.default_output_device().ok_or_else(|| {
            Error::SessionConfigFailed("No default output device found".to_string())
        })?;
        info!(
            "Using default audio device: {}",
            dev.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        Ok(dev)
    }

    /// Pick a stream config at the requested rate.
    ///
    /// Exact channel count is preferred; any channel count at the right rate
    /// is accepted since render duplicates mono into every channel.
    fn select_config(device: &Device, format: &OutputFormat) -> Result<(StreamConfig, SampleFormat)> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::FormatCreationFailed(format!("Failed to get device configs: {}", e)))?
            .filter(|c| {
                c.min_sample_rate().0 <= format.sample_rate
                    && c.max_sample_rate().0 >= format.sample_rate
            })
            .collect();

        let exact_channels = supported.iter().filter(|c| c.channels() == format.channels);
        let any_channels = supported.iter();

        for candidates in [exact_channels.collect::<Vec<_>>(), any_channels.collect::<Vec<_>>()] {
            for preferred in PREFERRED_FORMATS {
                if let Some(c) = candidates.iter().find(|c| c.sample_format() == preferred) {
                    let config = (*c)
                        .clone()
                        .with_sample_rate(cpal::SampleRate(format.sample_rate))
                        .config();
                    return Ok((config, preferred));
                }
            }
        }

        Err(Error::FormatCreationFailed(format!(
            "Device supports no F32/I16/U16 stream at {} Hz",
            format.sample_rate
        )))
    }

    fn build_stream_f32(
        configured: &ConfiguredDevice,
        node: Arc<OutputNode>,
        error_flag: Arc<AtomicBool>,
        error_count: Arc<AtomicU32>,
    ) -> Result<Stream> {
        let channels = configured.config.channels as usize;

        configured
            .device
            .build_output_stream(
                &configured.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    node.render_interleaved(data, channels);
                },
                move |err| {
                    error!("Audio stream error: {} - marking for rebuild", err);
                    error_flag.store(true, Ordering::SeqCst);
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::EngineStartFailed(format!("Failed to build stream: {}", e)))
    }

    /// Integer stream: render straight into the device buffer, converting
    /// each normalised sample
    fn build_stream_int<T, F>(
        configured: &ConfiguredDevice,
        node: Arc<OutputNode>,
        error_flag: Arc<AtomicBool>,
        error_count: Arc<AtomicU32>,
        convert: F,
    ) -> Result<Stream>
    where
        T: cpal::SizedSample + Send + 'static,
        F: Fn(f32) -> T + Send + 'static,
    {
        let channels = configured.config.channels as usize;

        configured
            .device
            .build_output_stream(
                &configured.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    node.render_converted(data, channels, &convert);
                },
                move |err| {
                    error!("Audio stream error: {} - marking for rebuild", err);
                    error_flag.store(true, Ordering::SeqCst);
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::EngineStartFailed(format!("Failed to build stream: {}", e)))
    }
}

impl OutputBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn stream_errors(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    fn configure(&mut self, format: &OutputFormat) -> Result<()> {
        let device = self.find_device()?;
        let (mut config, sample_format) = Self::select_config(&device, format)?;

        if let Some(size) = format.buffer_size_frames {
            config.buffer_size = cpal::BufferSize::Fixed(size);
            debug!("Using requested buffer size: {} frames", size);
        } else {
            debug!("Using device default buffer size");
        }

        if config.channels != format.channels {
            warn!(
                "Device has no {}-channel config at {} Hz, using {} channels",
                format.channels, format.sample_rate, config.channels
            );
        }

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        self.configured = Some(ConfiguredDevice {
            device,
            config,
            sample_format,
        });
        Ok(())
    }

    fn open(&mut self, node: Arc<OutputNode>) -> Result<Box<dyn OutputGraph>> {
        let configured = self
            .configured
            .as_ref()
            .ok_or_else(|| Error::EngineStartFailed("Output not configured".to_string()))?;

        info!("Starting audio stream");

        let error_flag = Arc::new(AtomicBool::new(false));
        let error_count = Arc::clone(&self.error_count);

        let stream = match configured.sample_format {
            SampleFormat::F32 => {
                Self::build_stream_f32(configured, node, Arc::clone(&error_flag), error_count)?
            }
            SampleFormat::I16 => Self::build_stream_int::<i16, _>(
                configured,
                node,
                Arc::clone(&error_flag),
                error_count,
                |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16,
            )?,
            SampleFormat::U16 => Self::build_stream_int::<u16, _>(
                configured,
                node,
                Arc::clone(&error_flag),
                error_count,
                // [-1.0, 1.0] → [0, 65535]
                |s| ((s.clamp(-1.0, 1.0) + 1.0) * 32767.5) as u16,
            )?,
            sample_format => {
                return Err(Error::FormatCreationFailed(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::EngineStartFailed(format!("Failed to start stream: {}", e)))?;

        info!("Audio stream started successfully");
        Ok(Box::new(CpalGraph {
            stream: Some(stream),
            error_flag,
        }))
    }
}

/// Running cpal stream
struct CpalGraph {
    stream: Option<Stream>,
    /// Set by the stream error callback
    error_flag: Arc<AtomicBool>,
}

impl OutputGraph for CpalGraph {
    fn is_running(&self) -> bool {
        self.stream.is_some() && !self.error_flag.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream");
            if let Err(e) = stream.pause() {
                warn!("Failed to pause stream: {}", e);
            }
        }
    }
}

impl Drop for CpalGraph {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices() {
        // Requires audio hardware; only verify it doesn't panic
        let result = CpalBackend::list_devices();
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_open_before_configure_is_engine_error() {
        use crate::playback::ring_buffer::SampleRingBuffer;
        use crate::playback::stats::PipelineStats;

        let ring = Arc::new(SampleRingBuffer::new(64, Arc::new(PipelineStats::new())));
        let node = Arc::new(OutputNode::new(ring, 8000, 48_000, 64));

        let mut backend = CpalBackend::new(None);
        match backend.open(node) {
            Err(Error::EngineStartFailed(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("open succeeded without configure"),
        }
    }
}
