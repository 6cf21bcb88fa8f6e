//! Synthetic sine source
//!
//! Produces a phase-continuous tone, companded with the configured codec, so
//! the whole bridge can be exercised without a camera.

use super::{frame_period, EncodedAudioSource, Pacer};
use crate::audio::decoder::{Codec, Decoder};
use crate::audio::types::EncodedFrame;
use crate::error::Result;
use std::f32::consts::TAU;
use std::time::Duration;

pub struct ToneSource {
    encoder: Decoder,
    frequency_hz: f32,
    amplitude: f32,
    sample_rate: u32,
    frame_samples: usize,
    phase: f32,
    sequence: u64,
    frame_limit: Option<u64>,
    pacer: Option<Pacer>,
}

impl ToneSource {
    /// Tone at half full scale, paced at real time
    pub fn new(codec: Codec, frequency_hz: f32, sample_rate: u32, frame_samples: usize) -> Self {
        let frame_samples = frame_samples.max(1);
        Self {
            encoder: Decoder::new(codec),
            frequency_hz,
            amplitude: 0.5,
            sample_rate,
            frame_samples,
            phase: 0.0,
            sequence: 0,
            frame_limit: None,
            pacer: Some(Pacer::new(frame_period(frame_samples, sample_rate))),
        }
    }

    /// Amplitude as a fraction of full scale, clamped to [0, 1]
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// End the stream after `frames` frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Pace frames `interval` apart instead of one frame's duration
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.pacer = Some(Pacer::new(interval));
        self
    }

    pub fn unpaced(mut self) -> Self {
        self.pacer = None;
        self
    }

    fn synthesize(&mut self) -> Vec<i16> {
        let step = TAU * self.frequency_hz / self.sample_rate.max(1) as f32;
        let peak = self.amplitude * i16::MAX as f32;

        (0..self.frame_samples)
            .map(|_| {
                let sample = (self.phase.sin() * peak) as i16;
                self.phase = (self.phase + step) % TAU;
                sample
            })
            .collect()
    }
}

impl EncodedAudioSource for ToneSource {
    fn next_frame(&mut self) -> Result<Option<EncodedFrame>> {
        if self.frame_limit.is_some_and(|limit| self.sequence >= limit) {
            return Ok(None);
        }

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }

        let pcm = self.synthesize();
        let frame = EncodedFrame::new(self.encoder.encode(&pcm), self.sequence, self.sample_rate);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!(
            "{} Hz tone ({}, {} Hz)",
            self.frequency_hz,
            self.encoder.codec(),
            self.sample_rate
        )
    }
}
