//! Deterministic test signals and simple output analysis

use camlink_bridge::audio::{Codec, Decoder, EncodedFrame};
use std::f32::consts::PI;

/// Sine wave as int16 PCM
pub fn sine_pcm(frequency_hz: f32, sample_rate: u32, samples: usize, peak: i16) -> Vec<i16> {
    (0..samples)
        .map(|n| {
            let t = n as f32 / sample_rate as f32;
            ((2.0 * PI * frequency_hz * t).sin() * peak as f32).round() as i16
        })
        .collect()
}

/// Split PCM into consecutive encoded frames of `frame_samples`
pub fn encode_frames(
    pcm: &[i16],
    codec: Codec,
    frame_samples: usize,
    sample_rate: u32,
    first_sequence: u64,
) -> Vec<EncodedFrame> {
    let encoder = Decoder::new(codec);
    pcm.chunks(frame_samples)
        .enumerate()
        .map(|(i, chunk)| {
            EncodedFrame::new(encoder.encode(chunk), first_sequence + i as u64, sample_rate)
        })
        .collect()
}

/// A-law frames of constant value
pub fn constant_alaw_frames(count: usize, frame_samples: usize, value: i16) -> Vec<EncodedFrame> {
    let pcm = vec![value; count * frame_samples];
    encode_frames(&pcm, Codec::Alaw, frame_samples, 8000, 0)
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
