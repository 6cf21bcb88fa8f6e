//! Lock-free overwrite ring buffer for decoded PCM
//!
//! Single-producer single-consumer circular buffer of mono int16 samples
//! between the frame producer (decoder path) and the real-time render
//! callback.
//!
//! Design:
//! - Indices are monotonic `u64` counters; storage is addressed modulo
//!   capacity. `read_index <= write_index` and
//!   `write_index - read_index <= capacity` hold at every observable point.
//! - Overflow drops the **oldest** unread samples: the producer advances the
//!   read index with compare-and-swap before overwriting their slots.
//! - The consumer copies out, then commits its read with compare-and-swap.
//!   If the producer overtook it in the meantime, the copy is discarded and
//!   the read retried from the new position.
//! - Samples are stored as `AtomicI16` so a racing overwrite can never be
//!   undefined behaviour, only a retried read.
//!
//! Neither side allocates or blocks; `read_into` is safe to call from the
//! audio callback.

use crate::playback::stats::PipelineStats;
use std::sync::atomic::{AtomicI16, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Lock-free SPSC ring buffer of int16 samples with drop-oldest overflow
pub struct SampleRingBuffer {
    samples: Box<[AtomicI16]>,
    capacity: usize,

    /// Total samples ever committed by the producer
    write_index: AtomicU64,

    /// Total samples ever consumed or dropped
    read_index: AtomicU64,

    stats: Arc<PipelineStats>,
}

impl SampleRingBuffer {
    /// Create a buffer holding `capacity` samples (minimum 1)
    pub fn new(capacity: usize, stats: Arc<PipelineStats>) -> Self {
        let capacity = capacity.max(1);
        debug!("Creating sample ring buffer with capacity: {} samples", capacity);

        let samples: Box<[AtomicI16]> = (0..capacity).map(|_| AtomicI16::new(0)).collect();
        Self {
            samples,
            capacity,
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
            stats,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    #[inline]
    fn slot(&self, index: u64) -> &AtomicI16 {
        &self.samples[(index % self.capacity as u64) as usize]
    }

    /// Append samples (producer side).
    ///
    /// When the write would exceed capacity the oldest unread samples are
    /// discarded and `overrun_count` grows by the number dropped. A single
    /// write longer than capacity keeps only its newest `capacity` samples.
    ///
    /// Returns the number of samples dropped by this call.
    pub fn write(&self, samples: &[i16]) -> usize {
        if samples.is_empty() {
            return 0;
        }

        let mut dropped = 0usize;
        let input = if samples.len() > self.capacity {
            dropped = samples.len() - self.capacity;
            &samples[dropped..]
        } else {
            samples
        };
        let n = input.len() as u64;

        // Producer owns write_index
        let w = self.write_index.load(Ordering::Relaxed);

        loop {
            let r = self.read_index.load(Ordering::Acquire);
            let used = w - r;
            let free = self.capacity as u64 - used;
            if n <= free {
                break;
            }

            let need = n - free;
            match self.read_index.compare_exchange(
                r,
                r + need,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    dropped += need as usize;
                    break;
                }
                // Consumer moved; recompute free space
                Err(_) => continue,
            }
        }

        for (offset, &sample) in input.iter().enumerate() {
            self.slot(w + offset as u64).store(sample, Ordering::Relaxed);
        }
        self.write_index.store(w + n, Ordering::Release);

        self.stats
            .total_samples_written
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
        if dropped > 0 {
            self.stats
                .overrun_count
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }

        dropped
    }

    /// Read up to `out.len()` samples in FIFO order (consumer side).
    ///
    /// Returns the number of samples copied; the caller zero-fills the rest.
    /// A request that cannot be fully satisfied increments `underrun_count`
    /// by exactly one.
    ///
    /// **REAL-TIME SAFE**: no allocation, no locks.
    pub fn read_into(&self, out: &mut [i16]) -> usize {
        let count = self.take_into(out);
        if count < out.len() {
            self.stats.underrun_count.fetch_add(1, Ordering::Relaxed);
        }
        count
    }

    /// [`read_into`](Self::read_into) without underrun accounting, for
    /// callers that split one logical request into several reads and count
    /// the shortfall themselves.
    pub(crate) fn take_into(&self, out: &mut [i16]) -> usize {
        if out.is_empty() {
            return 0;
        }

        let count = loop {
            let r = self.read_index.load(Ordering::Acquire);
            let w = self.write_index.load(Ordering::Acquire);
            let available = (w - r) as usize;
            let count = available.min(out.len());

            for (offset, dst) in out[..count].iter_mut().enumerate() {
                *dst = self.slot(r + offset as u64).load(Ordering::Relaxed);
            }

            if count == 0 {
                break 0;
            }

            // Producer dropped some of what we copied; start over
            if self
                .read_index
                .compare_exchange(r, r + count as u64, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break count;
            }
        };

        if count > 0 {
            self.stats
                .total_samples_read
                .fetch_add(count as u64, Ordering::Relaxed);
        }

        count
    }

    /// Allocating convenience wrapper around [`read_into`](Self::read_into)
    ///
    /// The returned vector holds only the samples actually read.
    pub fn read(&self, count: usize) -> Vec<i16> {
        let mut out = vec![0i16; count];
        let n = self.read_into(&mut out);
        out.truncate(n);
        out
    }

    /// Samples currently buffered (side-effect free)
    pub fn available_samples(&self) -> usize {
        let r = self.read_index.load(Ordering::Acquire);
        let w = self.write_index.load(Ordering::Acquire);
        w.saturating_sub(r) as usize
    }

    /// Fill level in [0.0, 1.0]
    pub fn fill_level(&self) -> f32 {
        self.available_samples() as f32 / self.capacity as f32
    }

    pub fn is_empty(&self) -> bool {
        self.available_samples() == 0
    }

    /// Discard all buffered samples.
    ///
    /// Only valid while neither producer nor consumer is active. Statistics
    /// are left untouched.
    pub fn clear(&self) {
        self.read_index.store(0, Ordering::Release);
        self.write_index.store(0, Ordering::Release);
    }

    /// Zero the counters this buffer maintains
    pub fn reset_statistics(&self) {
        self.stats.total_samples_written.store(0, Ordering::Relaxed);
        self.stats.total_samples_read.store(0, Ordering::Relaxed);
        self.stats.underrun_count.store(0, Ordering::Relaxed);
        self.stats.overrun_count.store(0, Ordering::Relaxed);
    }
}
