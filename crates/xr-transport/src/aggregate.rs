//! # Global Aggregator
//!
//! One shared instance folds every stream's QoE into a cross-stream summary.
//!
//! Streams register up front, so the aggregator knows how many finishers to
//! wait for. Each stream contributes exactly once; the registration token is
//! consumed by [`GlobalAggregator::contribute`]. The running sums, the
//! finished counter and the "last finisher publishes" decision all happen in
//! one critical section, and the decision is made against the
//! `summary_published` flag rather than the counter alone, so two streams
//! finishing together cannot both publish.
//!
//! The published summary lives in a write-once cell; readers never see a
//! partially updated value.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use serde::Serialize;

use crate::qoe::StreamQoESummary;

/// Proof that a stream was counted in the aggregator's stream total.
/// Consumed when the stream contributes.
#[derive(Debug)]
pub struct StreamRegistration {
    stream_id: usize,
}

impl StreamRegistration {
    pub fn stream_id(&self) -> usize {
        self.stream_id
    }
}

/// Raw shared totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlobalQoEState {
    pub stream_count: usize,
    pub satisfied_stream_count: usize,
    pub total_sum_error: f64,
    pub total_expected_frames: u64,
    pub total_on_time_frames: u64,
    pub finished_stream_count: usize,
    pub summary_published: bool,
}

impl GlobalQoEState {
    fn summarize(&self) -> GlobalQoESummary {
        let (mean_error, reliability) = if self.total_expected_frames == 0 {
            (0.0, 0.0)
        } else {
            let n = self.total_expected_frames as f64;
            (self.total_sum_error / n, self.total_on_time_frames as f64 / n)
        };
        GlobalQoESummary {
            stream_count: self.stream_count,
            satisfied_stream_count: self.satisfied_stream_count,
            total_expected_frames: self.total_expected_frames,
            total_on_time_frames: self.total_on_time_frames,
            total_sum_error: self.total_sum_error,
            global_mean_error: mean_error,
            global_delay_reliability: reliability,
        }
    }
}

/// The published cross-stream result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalQoESummary {
    pub stream_count: usize,
    pub satisfied_stream_count: usize,
    pub total_expected_frames: u64,
    pub total_on_time_frames: u64,
    pub total_sum_error: f64,
    pub global_mean_error: f64,
    pub global_delay_reliability: f64,
}

/// Shared cross-stream aggregator. Wrap in `Arc` to share between streams.
#[derive(Debug, Default)]
pub struct GlobalAggregator {
    state: Mutex<GlobalQoEState>,
    published: OnceLock<GlobalQoESummary>,
}

impl GlobalAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    // Totals are plain counters; a panic elsewhere cannot leave them torn.
    fn lock(&self) -> MutexGuard<'_, GlobalQoEState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one more stream in the total the aggregator waits for.
    pub fn register(&self) -> StreamRegistration {
        let mut state = self.lock();
        if state.summary_published {
            tracing::warn!(
                streams = state.stream_count,
                "stream registered after the global summary was published"
            );
        }
        state.stream_count += 1;
        StreamRegistration {
            stream_id: state.stream_count - 1,
        }
    }

    /// Fold one stream's result in. Returns the global summary if this
    /// contribution was the last one and nobody has published yet.
    pub fn contribute(
        &self,
        registration: StreamRegistration,
        summary: &StreamQoESummary,
    ) -> Option<GlobalQoESummary> {
        let mut state = self.lock();
        state.total_sum_error += summary.sum_error;
        state.total_expected_frames += summary.total_frames as u64;
        state.total_on_time_frames += summary.on_time_frames as u64;
        if summary.user_satisfied {
            state.satisfied_stream_count += 1;
        }
        state.finished_stream_count += 1;

        tracing::debug!(
            stream = registration.stream_id,
            finished = state.finished_stream_count,
            streams = state.stream_count,
            "stream contributed to global QoE"
        );

        if state.finished_stream_count < state.stream_count || state.summary_published {
            return None;
        }
        state.summary_published = true;
        let global = state.summarize();
        // Only the holder of the lock that flipped the flag gets here.
        let _ = self.published.set(global.clone());

        tracing::info!(
            streams = global.stream_count,
            satisfied = global.satisfied_stream_count,
            expected_frames = global.total_expected_frames,
            on_time_frames = global.total_on_time_frames,
            mean_error = global.global_mean_error,
            delay_reliability = global.global_delay_reliability,
            "global QoE summary published"
        );
        Some(global)
    }

    /// The published summary, once the last stream has contributed.
    pub fn published(&self) -> Option<&GlobalQoESummary> {
        self.published.get()
    }

    /// Copy of the current totals.
    pub fn snapshot(&self) -> GlobalQoEState {
        self.lock().clone()
    }
}
