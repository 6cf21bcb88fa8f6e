//! Core audio data types
//!
//! Defines the frame and format structures passed between the frame source,
//! the pipeline and the output backends.

use serde::Serialize;

/// Default source rate of narrowband G.711 streams
pub const DEFAULT_SOURCE_SAMPLE_RATE: u32 = 8000;

/// Default output rate requested from the audio device
pub const DEFAULT_TARGET_SAMPLE_RATE: u32 = 48_000;

/// Default upper bound on frames requested per render callback
pub const DEFAULT_MAX_FRAMES_PER_CALLBACK: usize = 4096;

/// One compressed audio frame as delivered by the external source.
///
/// The payload is opaque companded bytes (one byte per mono sample). The
/// pipeline takes ownership on arrival and decodes it exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Companded payload; never empty for a meaningful frame
    pub payload: Vec<u8>,

    /// Sender-assigned, monotonically increasing sequence number
    pub sequence: u64,

    /// Declared sample rate of the payload in Hz
    pub sample_rate: u32,
}

impl EncodedFrame {
    pub fn new(payload: Vec<u8>, sequence: u64, sample_rate: u32) -> Self {
        Self {
            payload,
            sequence,
            sample_rate,
        }
    }

    /// Number of mono samples this frame decodes to
    pub fn sample_count(&self) -> usize {
        self.payload.len()
    }

    /// Playback duration of this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.payload.len() as u64 * 1000) / self.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Fixed output format the render callback is registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputFormat {
    /// Output sample rate in Hz (the resampler's target rate)
    pub sample_rate: u32,

    /// Output channel count; the mono signal is duplicated into every channel
    pub channels: u16,

    /// Largest frame count a single render call is sized for
    pub max_frames_per_callback: usize,

    /// Requested device buffer size in frames (None = device default)
    pub buffer_size_frames: Option<u32>,
}

impl OutputFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            max_frames_per_callback: DEFAULT_MAX_FRAMES_PER_CALLBACK,
            buffer_size_frames: None,
        }
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames_per_callback = max_frames;
        self
    }

    pub fn with_buffer_size(mut self, frames: Option<u32>) -> Self {
        self.buffer_size_frames = frames;
        self
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SAMPLE_RATE, 2)
    }
}

/// Convert an int16-scale sample to the normalised f32 range [-1.0, 1.0)
#[inline]
pub fn i16_scale_to_f32(sample: f32) -> f32 {
    (sample / 32768.0).clamp(-1.0, 1.0)
}
