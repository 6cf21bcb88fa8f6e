//! Linear-interpolation sample rate conversion
//!
//! Maps mono int16 PCM at a source rate (8 kHz / 16 kHz camera audio) to the
//! output device rate. Stateless per call: each call interpolates only within
//! the block it is given and repeats the last sample rather than
//! extrapolating past the end.
//!
//! Source positions are computed with integer arithmetic
//! (`i * source_rate / target_rate` as quotient + remainder), so identical
//! inputs always produce bit-identical outputs.
//!
//! Output samples stay in the int16 scale (as f32); the output node
//! normalises to [-1.0, 1.0] when writing into the device buffer.

/// Linear-interpolation resampler.
pub struct Resampler;

impl Resampler {
    /// Number of output samples produced for `input_len` source samples:
    /// `floor(input_len * target_rate / source_rate)`.
    pub fn output_len(input_len: usize, source_rate: u32, target_rate: u32) -> usize {
        if source_rate == 0 {
            return 0;
        }
        ((input_len as u64 * target_rate as u64) / source_rate as u64) as usize
    }

    /// Number of source samples needed to produce `output_frames` samples:
    /// `ceil(output_frames * source_rate / target_rate)`.
    pub fn source_frames_needed(output_frames: usize, source_rate: u32, target_rate: u32) -> usize {
        if target_rate == 0 {
            return 0;
        }
        let numerator = output_frames as u64 * source_rate as u64;
        numerator.div_ceil(target_rate as u64) as usize
    }

    /// Resample `input` from `source_rate` to `target_rate`.
    ///
    /// Empty input (or a zero rate) yields empty output.
    pub fn resample(input: &[i16], source_rate: u32, target_rate: u32) -> Vec<f32> {
        let len = Self::output_len(input.len(), source_rate, target_rate);
        let mut output = vec![0.0f32; len];
        let written = Self::resample_into(input, source_rate, target_rate, &mut output);
        output.truncate(written);
        output
    }

    /// Resample into a caller-provided buffer without allocating.
    ///
    /// Writes `min(output_len(..), output.len())` samples and returns that
    /// count. Safe to call from the real-time render path.
    pub fn resample_into(
        input: &[i16],
        source_rate: u32,
        target_rate: u32,
        output: &mut [f32],
    ) -> usize {
        if input.is_empty() || source_rate == 0 || target_rate == 0 {
            return 0;
        }

        let count = Self::output_len(input.len(), source_rate, target_rate).min(output.len());
        let last = input.len() - 1;
        let src = source_rate as u64;
        let dst = target_rate as u64;
        let dst_f = target_rate as f32;

        for (i, out) in output[..count].iter_mut().enumerate() {
            let pos = i as u64 * src;
            let i0 = ((pos / dst) as usize).min(last);
            let frac = (pos % dst) as f32 / dst_f;
            let i1 = (i0 + 1).min(last);

            let a = input[i0] as f32;
            let b = input[i1] as f32;
            *out = a + (b - a) * frac;
        }

        count
    }
}
