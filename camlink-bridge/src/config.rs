//! Bridge configuration
//!
//! Bootstrap TOML file, resolved by `camlink_common::config`:
//! 1. `--config` command-line argument
//! 2. `CAMLINK_CONFIG` environment variable
//! 3. `<config_dir>/camlink/config.toml`
//! 4. Built-in defaults
//!
//! Every field has a default, so an empty (or absent) file is valid.
//!
//! ```toml
//! [audio]
//! codec = "alaw"
//! source_sample_rate = 8000
//! target_sample_rate = 48000
//!
//! [watchdog]
//! tick_interval_ms = 1000
//! max_restart_attempts = 3
//!
//! [source]
//! frame_bytes = 160
//! frame_interval_ms = 20
//! ```

use crate::audio::decoder::Codec;
use crate::audio::types::{
    OutputFormat, DEFAULT_MAX_FRAMES_PER_CALLBACK, DEFAULT_SOURCE_SAMPLE_RATE,
    DEFAULT_TARGET_SAMPLE_RATE,
};
use crate::error::{Error, Result};
use crate::playback::output_node::MAX_SOURCE_SAMPLE_RATE;
use crate::playback::pipeline::PipelineConfig;
use crate::playback::watchdog::{
    WatchdogConfig, DEFAULT_HEALTHY_TICKS_TO_RESET, DEFAULT_MAX_RESTART_ATTEMPTS,
};
use camlink_common::config::{load_or_default, LoggingConfig, CONFIG_ENV_VAR};
use camlink_common::time::{millis_to_duration, millis_to_samples};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub watchdog: WatchdogSection,

    #[serde(default)]
    pub output: OutputSection,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub source: SourceSection,
}

/// `[audio]` pipeline format settings
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub codec: Codec,

    /// Initial source rate; frames carrying a different rate tag override it
    #[serde(default = "default_source_sample_rate")]
    pub source_sample_rate: u32,

    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,

    #[serde(default = "default_output_channels")]
    pub output_channels: u16,

    /// Ring buffer capacity in milliseconds of source-rate audio
    #[serde(default = "default_buffer_capacity_ms")]
    pub buffer_capacity_ms: u32,

    #[serde(default = "default_max_frames_per_callback")]
    pub max_frames_per_callback: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            source_sample_rate: default_source_sample_rate(),
            target_sample_rate: default_target_sample_rate(),
            output_channels: default_output_channels(),
            buffer_capacity_ms: default_buffer_capacity_ms(),
            max_frames_per_callback: default_max_frames_per_callback(),
        }
    }
}

/// `[watchdog]` stall detection settings
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSection {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,

    /// 0 disables restart budget recovery
    #[serde(default = "default_healthy_ticks_to_reset")]
    pub healthy_ticks_to_reset: u32,
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_restart_attempts: default_max_restart_attempts(),
            healthy_ticks_to_reset: default_healthy_ticks_to_reset(),
        }
    }
}

/// `[output]` device settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputSection {
    /// Output device name (None = system default)
    #[serde(default)]
    pub device: Option<String>,

    /// Fixed device buffer size in frames (None = device default)
    #[serde(default)]
    pub buffer_size_frames: Option<u32>,
}

/// `[source]` settings for the file and tone sources
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    /// Payload bytes per frame (160 = 20 ms at 8 kHz)
    #[serde(default = "default_frame_bytes")]
    pub frame_bytes: usize,

    /// Pacing period for file and tone sources. Absent means one frame's
    /// worth of audio (`frame_bytes` at the source rate).
    #[serde(default)]
    pub frame_interval_ms: Option<u64>,

    /// Tone source frequency
    #[serde(default = "default_tone_frequency_hz")]
    pub tone_frequency_hz: f32,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            frame_bytes: default_frame_bytes(),
            frame_interval_ms: None,
            tone_frequency_hz: default_tone_frequency_hz(),
        }
    }
}

fn default_source_sample_rate() -> u32 {
    DEFAULT_SOURCE_SAMPLE_RATE
}

fn default_target_sample_rate() -> u32 {
    DEFAULT_TARGET_SAMPLE_RATE
}

fn default_output_channels() -> u16 {
    2
}

fn default_buffer_capacity_ms() -> u32 {
    500
}

fn default_max_frames_per_callback() -> usize {
    DEFAULT_MAX_FRAMES_PER_CALLBACK
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_max_restart_attempts() -> u32 {
    DEFAULT_MAX_RESTART_ATTEMPTS
}

fn default_healthy_ticks_to_reset() -> u32 {
    DEFAULT_HEALTHY_TICKS_TO_RESET
}

fn default_frame_bytes() -> usize {
    160
}

fn default_tone_frequency_hz() -> f32 {
    440.0
}

impl BridgeConfig {
    /// Resolve, load and validate the config file
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let config: BridgeConfig = load_or_default(cli_path, CONFIG_ENV_VAR)?;
        config.validate()?;
        debug!("Bridge configuration: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;

        if audio.source_sample_rate == 0 || audio.source_sample_rate > MAX_SOURCE_SAMPLE_RATE {
            return Err(Error::Config(format!(
                "audio.source_sample_rate must be in 1..={} (got {})",
                MAX_SOURCE_SAMPLE_RATE, audio.source_sample_rate
            )));
        }
        if audio.target_sample_rate == 0 {
            return Err(Error::Config("audio.target_sample_rate must be non-zero".to_string()));
        }
        if audio.output_channels == 0 {
            return Err(Error::Config("audio.output_channels must be non-zero".to_string()));
        }
        if audio.max_frames_per_callback == 0 {
            return Err(Error::Config(
                "audio.max_frames_per_callback must be non-zero".to_string(),
            ));
        }

        let one_callback = crate::audio::resampler::Resampler::source_frames_needed(
            audio.max_frames_per_callback,
            audio.source_sample_rate,
            audio.target_sample_rate,
        );
        if self.buffer_capacity_samples() < one_callback {
            return Err(Error::Config(format!(
                "audio.buffer_capacity_ms ({} ms = {} samples) is smaller than one callback ({} samples)",
                audio.buffer_capacity_ms,
                self.buffer_capacity_samples(),
                one_callback
            )));
        }

        if self.watchdog.tick_interval_ms == 0 {
            return Err(Error::Config("watchdog.tick_interval_ms must be non-zero".to_string()));
        }
        if self.source.frame_bytes == 0 {
            return Err(Error::Config("source.frame_bytes must be non-zero".to_string()));
        }
        if self.source.frame_interval_ms == Some(0) {
            return Err(Error::Config(
                "source.frame_interval_ms must be non-zero when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Source pacing period, if overridden
    pub fn frame_interval(&self) -> Option<Duration> {
        self.source.frame_interval_ms.map(millis_to_duration)
    }

    /// Ring buffer capacity in source-rate samples
    pub fn buffer_capacity_samples(&self) -> usize {
        millis_to_samples(self.audio.buffer_capacity_ms as u64, self.audio.source_sample_rate) as usize
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::new(self.audio.target_sample_rate, self.audio.output_channels)
            .with_max_frames(self.audio.max_frames_per_callback)
            .with_buffer_size(self.output.buffer_size_frames)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            codec: self.audio.codec,
            source_sample_rate: self.audio.source_sample_rate,
            buffer_capacity_samples: self.buffer_capacity_samples(),
            output_format: self.output_format(),
            tick_interval: millis_to_duration(self.watchdog.tick_interval_ms),
            watchdog: WatchdogConfig {
                max_restart_attempts: self.watchdog.max_restart_attempts,
                healthy_ticks_to_reset: self.watchdog.healthy_ticks_to_reset,
            },
        }
    }
}
