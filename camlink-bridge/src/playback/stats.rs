//! Cumulative pipeline counters
//!
//! Shared (via `Arc`) between the ring buffer, the output node and the
//! watchdog supervisor. Every field is an atomic so the real-time render path
//! can update it without locks; readers take a [`PipelineStatsSnapshot`].

use camlink_common::PipelineState;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free cumulative counters for one pipeline
pub struct PipelineStats {
    /// Monotonic reference point for callback timestamps
    start_time: Instant,

    pub(crate) total_samples_written: AtomicU64,
    pub(crate) total_samples_read: AtomicU64,

    /// Render requests the ring buffer could not fully satisfy
    pub(crate) underrun_count: AtomicU64,

    /// Samples dropped by the overwrite policy
    pub(crate) overrun_count: AtomicU64,

    pub(crate) callback_count: AtomicU64,

    /// Nanoseconds since `start_time` of the last render call, 0 = never
    last_callback_ns: AtomicU64,

    /// Frames accepted by `push_encoded_frame` (after duplicate filtering)
    pub(crate) frames_received: AtomicU64,

    /// Frames discarded as duplicates or stale
    pub(crate) duplicate_frames: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_samples_written: AtomicU64::new(0),
            total_samples_read: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            overrun_count: AtomicU64::new(0),
            callback_count: AtomicU64::new(0),
            last_callback_ns: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            duplicate_frames: AtomicU64::new(0),
        }
    }

    /// Record one render invocation
    ///
    /// **REAL-TIME SAFE**: two atomic stores, no system calls beyond the
    /// monotonic clock read.
    #[inline]
    pub fn record_callback(&self) {
        let elapsed_ns = self.start_time.elapsed().as_nanos() as u64;
        // 0 is reserved for "never"
        self.last_callback_ns.store(elapsed_ns.max(1), Ordering::Relaxed);
        self.callback_count.fetch_add(1, Ordering::Release);
    }

    pub fn callback_count(&self) -> u64 {
        self.callback_count.load(Ordering::Acquire)
    }

    /// Reset only the callback counter (done after every output rebuild)
    pub fn reset_callback_count(&self) {
        self.callback_count.store(0, Ordering::Release);
    }

    /// Time since the last render call, `None` if render never ran
    pub fn last_callback_age(&self) -> Option<Duration> {
        let ns = self.last_callback_ns.load(Ordering::Relaxed);
        if ns == 0 {
            return None;
        }
        let now_ns = self.start_time.elapsed().as_nanos() as u64;
        Some(Duration::from_nanos(now_ns.saturating_sub(ns)))
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    pub fn overrun_count(&self) -> u64 {
        self.overrun_count.load(Ordering::Relaxed)
    }

    pub fn total_samples_written(&self) -> u64 {
        self.total_samples_written.load(Ordering::Relaxed)
    }

    pub fn total_samples_read(&self) -> u64 {
        self.total_samples_read.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn duplicate_frames(&self) -> u64 {
        self.duplicate_frames.load(Ordering::Relaxed)
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.total_samples_written.store(0, Ordering::Relaxed);
        self.total_samples_read.store(0, Ordering::Relaxed);
        self.underrun_count.store(0, Ordering::Relaxed);
        self.overrun_count.store(0, Ordering::Relaxed);
        self.last_callback_ns.store(0, Ordering::Relaxed);
        self.frames_received.store(0, Ordering::Relaxed);
        self.duplicate_frames.store(0, Ordering::Relaxed);
        self.callback_count.store(0, Ordering::Release);
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the pipeline counters for diagnostics consumers
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatsSnapshot {
    pub state: PipelineState,
    pub total_samples_written: u64,
    pub total_samples_read: u64,
    pub underrun_count: u64,
    pub overrun_count: u64,
    pub callback_count: u64,
    /// Milliseconds since the last render call (None if render never ran)
    pub last_callback_age_ms: Option<u64>,
    pub frames_received: u64,
    pub duplicate_frames: u64,
    pub buffered_samples: usize,
    pub buffer_capacity: usize,
    pub fill_level: f32,
    pub source_sample_rate: u32,
    pub target_sample_rate: u32,
    pub restart_attempts: u32,
    pub max_restart_attempts: u32,
    /// Platform stream errors reported by the output backend
    pub output_stream_errors: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_recording() {
        let stats = PipelineStats::new();
        assert_eq!(stats.callback_count(), 0);
        assert!(stats.last_callback_age().is_none());

        stats.record_callback();
        stats.record_callback();
        assert_eq!(stats.callback_count(), 2);
        assert!(stats.last_callback_age().is_some());

        stats.reset_callback_count();
        assert_eq!(stats.callback_count(), 0);
        // Timestamp survives a callback-count reset
        assert!(stats.last_callback_age().is_some());
    }

    #[test]
    fn test_reset_clears_everything() {
        let stats = PipelineStats::new();
        stats.total_samples_written.store(10, Ordering::Relaxed);
        stats.underrun_count.store(3, Ordering::Relaxed);
        stats.duplicate_frames.store(1, Ordering::Relaxed);
        stats.record_callback();

        stats.reset();
        assert_eq!(stats.total_samples_written(), 0);
        assert_eq!(stats.underrun_count(), 0);
        assert_eq!(stats.duplicate_frames(), 0);
        assert_eq!(stats.callback_count(), 0);
        assert!(stats.last_callback_age().is_none());
    }
}
