//! Aggregate upload progress.
//!
//! Chunks complete out of order and a completion may be reported more than
//! once; the tracker sums by chunk identity so each chunk contributes exactly
//! once and the percentage never moves backwards.

use std::collections::HashSet;

use serde::Serialize;

/// A single progress observation, suitable for direct display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    /// `floor(uploaded / total * 100)`, clamped to 100.
    pub percent: u8,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
}

/// Receives aggregate progress observations.
///
/// Emission is fire-and-forget: implementations must not block the caller on
/// a slow consumer.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
}

/// Aggregates per-chunk acknowledgments into a monotonic percentage.
#[derive(Debug)]
pub struct ProgressTracker {
    total_bytes: u64,
    uploaded_bytes: u64,
    acked: HashSet<u32>,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            uploaded_bytes: 0,
            acked: HashSet::new(),
        }
    }

    /// Records the acknowledgment of one chunk.
    ///
    /// Returns the new aggregate on the first acknowledgment of a given chunk
    /// index; re-delivery of the same index returns `None` and does not
    /// double-count.
    pub fn record(&mut self, chunk_index: u32, bytes: u64) -> Option<ProgressUpdate> {
        if !self.acked.insert(chunk_index) {
            return None;
        }

        self.uploaded_bytes = (self.uploaded_bytes + bytes).min(self.total_bytes);
        Some(self.snapshot())
    }

    /// Returns the current aggregate without recording anything.
    pub fn snapshot(&self) -> ProgressUpdate {
        let percent = if self.total_bytes == 0 {
            100
        } else {
            ((self.uploaded_bytes * 100 / self.total_bytes) as u8).min(100)
        };

        ProgressUpdate {
            percent,
            uploaded_bytes: self.uploaded_bytes,
            total_bytes: self.total_bytes,
        }
    }

    /// Number of distinct chunks acknowledged so far.
    pub fn acked_count(&self) -> usize {
        self.acked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_out_of_order_completions() {
        let mut tracker = ProgressTracker::new(300);

        let u1 = tracker.record(2, 100).unwrap();
        assert_eq!(u1.percent, 33);
        assert_eq!(u1.uploaded_bytes, 100);

        let u2 = tracker.record(0, 100).unwrap();
        assert_eq!(u2.percent, 66);

        let u3 = tracker.record(1, 100).unwrap();
        assert_eq!(u3.percent, 100);
        assert_eq!(u3.uploaded_bytes, 300);
    }

    #[test]
    fn redelivery_does_not_double_count() {
        let mut tracker = ProgressTracker::new(200);

        assert!(tracker.record(0, 100).is_some());
        assert!(tracker.record(0, 100).is_none());
        assert_eq!(tracker.snapshot().uploaded_bytes, 100);
        assert_eq!(tracker.snapshot().percent, 50);
        assert_eq!(tracker.acked_count(), 1);
    }

    #[test]
    fn percentage_is_monotonic_and_clamped() {
        let mut tracker = ProgressTracker::new(250);
        let mut last = 0u8;

        // Deliberately over-report bytes to exercise the clamp
        for (index, bytes) in [(3u32, 100u64), (1, 100), (0, 100), (2, 100)] {
            if let Some(update) = tracker.record(index, bytes) {
                assert!(update.percent >= last, "progress went backwards");
                assert!(update.percent <= 100);
                last = update.percent;
            }
        }

        assert_eq!(tracker.snapshot().uploaded_bytes, 250, "must clamp to total");
        assert_eq!(last, 100);
    }

    #[test]
    fn percent_uses_floor() {
        let mut tracker = ProgressTracker::new(3);
        let update = tracker.record(0, 1).unwrap();
        assert_eq!(update.percent, 33);
    }

    #[test]
    fn empty_total_reports_complete() {
        let tracker = ProgressTracker::new(0);
        assert_eq!(tracker.snapshot().percent, 100);
    }
}
