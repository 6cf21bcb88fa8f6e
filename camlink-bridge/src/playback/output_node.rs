//! Pull-based render node between the ring buffer and the audio device
//!
//! Each hardware callback asks for N frames at the target rate. The node
//! converts that to the number of source-rate samples needed, reads them from
//! the ring buffer, resamples, normalises to [-1.0, 1.0] and writes the result
//! into the device buffer, padding with silence when the buffer runs dry.
//!
//! **REAL-TIME SAFE**: render never allocates, never blocks and never logs.
//! Scratch buffers are pre-allocated and guarded by a `try_lock`; a contended
//! lock renders silence instead of waiting.

use crate::audio::resampler::Resampler;
use crate::audio::types::i16_scale_to_f32;
use crate::playback::ring_buffer::SampleRingBuffer;
use crate::playback::stats::PipelineStats;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use tracing::debug;

/// Highest source rate the node's scratch buffers are sized for
pub const MAX_SOURCE_SAMPLE_RATE: u32 = 96_000;

struct RenderScratch {
    /// Source-rate samples read from the ring buffer
    pcm: Vec<i16>,
    /// One chunk of resampled, normalised mono output
    mono: Vec<f32>,
}

/// Render node driven by the output device callback
pub struct OutputNode {
    ring: Arc<SampleRingBuffer>,
    stats: Arc<PipelineStats>,

    /// Cleared by `stop()` before teardown; checked first in render
    running: AtomicBool,

    source_rate: AtomicU32,
    target_rate: u32,
    max_frames: usize,

    scratch: Mutex<RenderScratch>,
}

impl OutputNode {
    /// Create a node rendering at `target_rate`, sized for requests of up to
    /// `max_frames` frames per chunk.
    pub fn new(
        ring: Arc<SampleRingBuffer>,
        source_rate: u32,
        target_rate: u32,
        max_frames: usize,
    ) -> Self {
        let max_frames = max_frames.max(1);
        let pcm_len = Resampler::source_frames_needed(max_frames, MAX_SOURCE_SAMPLE_RATE, target_rate)
            .max(max_frames);

        debug!(
            "OutputNode: source_rate={}, target_rate={}, max_frames={}, pcm_scratch={}",
            source_rate, target_rate, max_frames, pcm_len
        );

        let stats = Arc::clone(ring.stats());
        Self {
            ring,
            stats,
            running: AtomicBool::new(false),
            source_rate: AtomicU32::new(source_rate),
            target_rate,
            max_frames,
            scratch: Mutex::new(RenderScratch {
                pcm: vec![0; pcm_len],
                mono: vec![0.0; max_frames],
            }),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate.load(Ordering::Acquire)
    }

    /// Switch the source rate; returns the previous rate.
    ///
    /// Rates of zero or above [`MAX_SOURCE_SAMPLE_RATE`] are ignored.
    pub fn set_source_rate(&self, rate: u32) -> u32 {
        if rate == 0 || rate > MAX_SOURCE_SAMPLE_RATE {
            return self.source_rate();
        }
        self.source_rate.swap(rate, Ordering::AcqRel)
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn ring(&self) -> &Arc<SampleRingBuffer> {
        &self.ring
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Render `out.len()` mono frames. Returns `true` when the whole buffer is
    /// silence.
    pub fn render(&self, out: &mut [f32]) -> bool {
        self.render_interleaved(out, 1)
    }

    /// Render into an interleaved buffer of `channels` channels, duplicating
    /// the mono signal into every channel. Returns `true` for silence.
    pub fn render_interleaved(&self, out: &mut [f32], channels: usize) -> bool {
        self.render_converted(out, channels, |s| s)
    }

    /// Render into an interleaved device buffer of any sample type, applying
    /// `convert` to each normalised sample. Returns `true` for silence.
    ///
    /// One call is one callback: it is counted once, and a request the ring
    /// buffer cannot fully satisfy counts one underrun however many chunks it
    /// is split into.
    pub fn render_converted<T, F>(&self, out: &mut [T], channels: usize, convert: F) -> bool
    where
        T: Copy,
        F: Fn(f32) -> T,
    {
        let silence = convert(0.0);
        if !self.is_running() {
            out.fill(silence);
            return true;
        }

        self.stats.record_callback();

        let mut guard = match self.scratch.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                out.fill(silence);
                return true;
            }
        };
        let RenderScratch { pcm, mono } = &mut *guard;

        let channels = channels.max(1);
        let frames = out.len() / channels;
        let source_rate = self.source_rate();
        let mut has_audio = false;
        let mut short = false;
        let mut frame_offset = 0;

        while frame_offset < frames {
            let chunk = (frames - frame_offset).min(self.max_frames);
            let mono = &mut mono[..chunk];
            let fill = self.fill_mono(pcm, mono, source_rate);
            has_audio |= fill.read > 0;
            short |= fill.read < fill.needed;

            let dst = &mut out[frame_offset * channels..(frame_offset + chunk) * channels];
            for (frame, &sample) in dst.chunks_exact_mut(channels).zip(mono.iter()) {
                frame.fill(convert(sample));
            }
            frame_offset += chunk;
        }

        if short {
            self.stats.underrun_count.fetch_add(1, Ordering::Relaxed);
        }

        // Trailing samples that do not form a whole frame
        out[frames * channels..].fill(silence);

        !has_audio
    }

    /// Produce one chunk of normalised mono output
    fn fill_mono(&self, pcm: &mut [i16], mono: &mut [f32], source_rate: u32) -> ChunkFill {
        let needed = Resampler::source_frames_needed(mono.len(), source_rate, self.target_rate)
            .min(pcm.len());
        let read = self.ring.take_into(&mut pcm[..needed]);
        if read == 0 {
            mono.fill(0.0);
            return ChunkFill { needed, read };
        }

        let produced = Resampler::resample_into(&pcm[..read], source_rate, self.target_rate, mono);
        for sample in &mut mono[..produced] {
            *sample = i16_scale_to_f32(*sample);
        }
        mono[produced..].fill(0.0);
        ChunkFill { needed, read }
    }
}

/// Source samples one chunk asked the ring buffer for, and what it got
#[derive(Debug, Clone, Copy)]
struct ChunkFill {
    needed: usize,
    read: usize,
}
