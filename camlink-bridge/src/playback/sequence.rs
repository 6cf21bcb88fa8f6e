//! Duplicate and out-of-order frame filtering
//!
//! Tracks a sliding window of recently seen sequence numbers relative to the
//! highest one. Late frames inside the window are still accepted (the audio is
//! better late than lost); repeats inside the window and anything older than
//! the window are discarded.

/// Width of the duplicate-detection window in frames
pub const SEQUENCE_WINDOW: u64 = 64;

/// Backwards jump treated as a sender restart rather than a stale frame
pub const SEQUENCE_RESET_THRESHOLD: u64 = 1024;

/// Outcome of checking one sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceVerdict {
    /// New frame, in order or late but inside the window
    Accepted,
    /// Already seen
    Duplicate,
    /// Older than the window
    Stale,
    /// Large backwards jump; filter restarted from this frame
    Reset,
}

impl SequenceVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SequenceVerdict::Accepted | SequenceVerdict::Reset)
    }
}

#[derive(Debug, Default)]
pub struct SequenceFilter {
    highest: Option<u64>,
    /// Bit k set = sequence `highest - k` has been seen
    seen: u64,
}

impl SequenceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highest(&self) -> Option<u64> {
        self.highest
    }

    pub fn reset(&mut self) {
        self.highest = None;
        self.seen = 0;
    }

    pub fn check(&mut self, sequence: u64) -> SequenceVerdict {
        let Some(highest) = self.highest else {
            self.restart_at(sequence);
            return SequenceVerdict::Accepted;
        };

        if sequence > highest {
            let shift = sequence - highest;
            self.seen = if shift >= SEQUENCE_WINDOW { 0 } else { self.seen << shift };
            self.seen |= 1;
            self.highest = Some(sequence);
            return SequenceVerdict::Accepted;
        }

        let back = highest - sequence;
        if back > SEQUENCE_RESET_THRESHOLD {
            self.restart_at(sequence);
            return SequenceVerdict::Reset;
        }
        if back >= SEQUENCE_WINDOW {
            return SequenceVerdict::Stale;
        }

        let bit = 1u64 << back;
        if self.seen & bit != 0 {
            SequenceVerdict::Duplicate
        } else {
            self.seen |= bit;
            SequenceVerdict::Accepted
        }
    }

    fn restart_at(&mut self, sequence: u64) {
        self.highest = Some(sequence);
        self.seen = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_frames_accepted() {
        let mut filter = SequenceFilter::new();
        for seq in 0..200 {
            assert_eq!(filter.check(seq), SequenceVerdict::Accepted);
        }
        assert_eq!(filter.highest(), Some(199));
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut filter = SequenceFilter::new();
        filter.check(10);
        filter.check(11);
        assert_eq!(filter.check(11), SequenceVerdict::Duplicate);
        assert_eq!(filter.check(10), SequenceVerdict::Duplicate);
    }

    #[test]
    fn test_late_frame_inside_window_accepted_once() {
        let mut filter = SequenceFilter::new();
        filter.check(100);
        filter.check(102);
        assert_eq!(filter.check(101), SequenceVerdict::Accepted);
        assert_eq!(filter.check(101), SequenceVerdict::Duplicate);
    }

    #[test]
    fn test_frame_older_than_window_is_stale() {
        let mut filter = SequenceFilter::new();
        filter.check(500);
        assert_eq!(filter.check(500 - SEQUENCE_WINDOW), SequenceVerdict::Stale);
        assert_eq!(filter.check(437), SequenceVerdict::Accepted);
    }

    #[test]
    fn test_large_backwards_jump_resets() {
        let mut filter = SequenceFilter::new();
        filter.check(5000);
        let verdict = filter.check(3);
        assert_eq!(verdict, SequenceVerdict::Reset);
        assert!(verdict.is_accepted());
        assert_eq!(filter.check(4), SequenceVerdict::Accepted);
        assert_eq!(filter.check(3), SequenceVerdict::Duplicate);
    }

    #[test]
    fn test_gap_larger_than_window_forgets_history() {
        let mut filter = SequenceFilter::new();
        filter.check(1);
        filter.check(1 + SEQUENCE_WINDOW * 2);
        // Still inside reset threshold, outside window
        assert_eq!(filter.check(1), SequenceVerdict::Stale);
    }
}
