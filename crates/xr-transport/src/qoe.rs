//! # Per-Stream QoE
//!
//! Reduces a stream's frame states to one [`StreamQoESummary`]. Every ratio,
//! and the mean error, is normalised by the *expected* frame count: a stream
//! that loses most of its frames must show a high mean error, not a low one
//! computed over the few survivors.

use serde::Serialize;

use crate::reassembly::ReassemblyTracker;

/// Stream-level QoE result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamQoESummary {
    pub total_frames: u32,
    pub received_frames: u32,
    pub on_time_frames: u32,
    pub late_frames: u32,
    pub lost_frames: u32,
    /// Lost frames that had at least one fragment (subset of `lost_frames`).
    pub partial_frames: u32,
    pub sum_error: f64,
    pub mean_error: f64,
    pub delivery_ratio: f64,
    pub on_time_ratio: f64,
    pub loss_ratio: f64,
    /// Mean delay over received frames.
    pub avg_delay_ms: f64,
    /// Share of expected frames delivered within the deadline.
    pub delay_reliability: f64,
    pub user_satisfied: bool,
    pub deadline_ms: f64,
    pub reliability_threshold: f64,
}

impl StreamQoESummary {
    /// Single pass over `1..=expected_total_frames`.
    ///
    /// Frame numbers missing from the tracker score as lost with the
    /// classifier's penalty, so the result is the same whether or not loss
    /// detection has run.
    pub fn compute(
        tracker: &ReassemblyTracker,
        expected_total_frames: u32,
        reliability_threshold: f64,
    ) -> Self {
        let penalty = tracker.classifier().max_penalty();

        let mut received = 0u32;
        let mut on_time = 0u32;
        let mut late = 0u32;
        let mut lost = 0u32;
        let mut partial = 0u32;
        let mut sum_error = 0.0;
        let mut sum_delay = 0.0;

        for seq in 1..=expected_total_frames {
            let Some(state) = tracker.get(seq) else {
                lost += 1;
                sum_error += penalty;
                continue;
            };
            sum_error += state.effective_error;
            match state.delay_ms {
                Some(delay) => {
                    received += 1;
                    sum_delay += delay;
                    if state.received_on_time {
                        on_time += 1;
                    } else {
                        late += 1;
                    }
                }
                None => {
                    lost += 1;
                    if state.fragments_received > 0 {
                        partial += 1;
                    }
                }
            }
        }

        let ratio = |n: u32| {
            if expected_total_frames == 0 {
                0.0
            } else {
                n as f64 / expected_total_frames as f64
            }
        };
        let mean_error = if expected_total_frames == 0 {
            0.0
        } else {
            sum_error / expected_total_frames as f64
        };
        let on_time_ratio = ratio(on_time);
        let delay_reliability = on_time_ratio;

        StreamQoESummary {
            total_frames: expected_total_frames,
            received_frames: received,
            on_time_frames: on_time,
            late_frames: late,
            lost_frames: lost,
            partial_frames: partial,
            sum_error,
            mean_error,
            delivery_ratio: ratio(received),
            on_time_ratio,
            loss_ratio: ratio(lost),
            avg_delay_ms: if received == 0 {
                0.0
            } else {
                sum_delay / received as f64
            },
            delay_reliability,
            user_satisfied: delay_reliability >= reliability_threshold,
            deadline_ms: tracker.classifier().deadline_ms(),
            reliability_threshold,
        }
    }
}
