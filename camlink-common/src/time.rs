//! Sample and duration conversions

use std::time::Duration;

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Duration covered by `samples` mono samples at `sample_rate` Hz
pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(samples.saturating_mul(1_000_000_000) / sample_rate as u64)
}

/// Number of samples covering `millis` milliseconds at `sample_rate` Hz
pub fn millis_to_samples(millis: u64, sample_rate: u32) -> u64 {
    millis.saturating_mul(sample_rate as u64) / 1000
}
