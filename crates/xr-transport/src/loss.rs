//! # Loss Detection
//!
//! Runs once per stream after no more fragments can arrive. Every frame
//! number in `1..=expected` that was never tracked gets a synthesized lost
//! state (no delay, not on time, penalty error).
//!
//! Frames that received some but not all fragments are left as they are:
//! they are already incomplete and score exactly like absent frames. The
//! report lists them separately so hosts can tell the two apart in logs.

use serde::Serialize;

use crate::reassembly::ReassemblyTracker;

/// What loss detection found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LossReport {
    /// Frame numbers with no fragment at all, now synthesized as lost.
    pub absent: Vec<u32>,
    /// Frame numbers with some fragments but no completion.
    pub partial: Vec<u32>,
}

impl LossReport {
    /// Everything that will score as lost.
    pub fn lost_count(&self) -> usize {
        self.absent.len() + self.partial.len()
    }
}

/// Fill in every missing frame number in `1..=expected_total_frames`.
pub fn detect_lost_frames(
    tracker: &mut ReassemblyTracker,
    expected_total_frames: u32,
) -> LossReport {
    let mut report = LossReport::default();
    for seq in 1..=expected_total_frames {
        if tracker.insert_absent(seq) {
            report.absent.push(seq);
        } else if tracker
            .get(seq)
            .is_some_and(|s| s.fragments_received > 0 && !s.is_complete())
        {
            report.partial.push(seq);
        }
    }

    tracing::debug!(
        expected = expected_total_frames,
        absent = report.absent.len(),
        partial = report.partial.len(),
        "loss detection complete"
    );
    report
}
