//! # Receiver State Machine
//!
//! Pure logic, no I/O. Accepts fragments with the instant they arrived,
//! reassembles them into frames, classifies each completed frame against
//! the deadline and, when the stream ends, scores it and contributes the
//! score to the shared [`GlobalAggregator`].
//!
//! ## Lifecycle
//!
//! `Active` until [`Receiver::finalize`] runs, `Finalized` after. Finalizing
//! twice returns the first result and contributes nothing new, so a stream is
//! never counted twice in the global totals. Fragments arriving after
//! finalize are ignored.
//!
//! Per-frame results are queued as [`ReceiverEvent`]s for hosts that write
//! result files; draining them is optional.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregate::{GlobalAggregator, GlobalQoESummary, StreamRegistration};
use crate::deadline::{DeadlineClassifier, DEFAULT_MAX_PENALTY};
use crate::error::ConfigError;
use crate::fragment::FragmentDescriptor;
use crate::loss::{detect_lost_frames, LossReport};
use crate::qoe::StreamQoESummary;
use crate::reassembly::{
    FrameReceptionState, IngestStatus, ReassemblyTracker, INCOMPLETE_DELAY_MS,
};
use crate::stats::ReceiverStats;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Receiver configuration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Latency budget per frame (ms, inclusive).
    pub deadline_ms: f64,
    /// Minimum on-time share for the user to count as satisfied.
    pub reliability_threshold: f64,
    /// Frames numbered `1..=expected_total_frames` are scored.
    pub expected_total_frames: u32,
    /// Effective error for late and lost frames.
    pub max_penalty: f64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            deadline_ms: 40.0,
            reliability_threshold: 0.99,
            expected_total_frames: 100,
            max_penalty: DEFAULT_MAX_PENALTY,
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.reliability_threshold) {
            return Err(ConfigError::InvalidThreshold(self.reliability_threshold));
        }
        if !self.deadline_ms.is_finite() || self.deadline_ms < 0.0 {
            return Err(ConfigError::InvalidDeadline(self.deadline_ms));
        }
        if !self.max_penalty.is_finite() || self.max_penalty < 0.0 {
            return Err(ConfigError::InvalidPenalty(self.max_penalty));
        }
        Ok(())
    }
}

// ─── Events ─────────────────────────────────────────────────────────────────

/// One per-frame result row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameRecord {
    pub frame_number: u32,
    pub component_count: u32,
    pub reconstruction_error: f64,
    pub size_bytes: u32,
    pub generation_timestamp: f64,
    pub reception_timestamp: f64,
    /// [`INCOMPLETE_DELAY_MS`] for lost frames.
    pub delay_ms: f64,
    pub received_on_time: bool,
    pub effective_error: f64,
    pub deadline_ms: f64,
}

impl FrameRecord {
    fn completed(frame_number: u32, state: &FrameReceptionState, deadline_ms: f64) -> Self {
        FrameRecord {
            frame_number,
            component_count: state.component_count,
            reconstruction_error: state.reconstruction_error,
            size_bytes: state.size_bytes,
            generation_timestamp: state.generation_timestamp,
            reception_timestamp: state.completed_at.unwrap_or(state.first_arrival_timestamp),
            delay_ms: state.delay_ms_or_sentinel(),
            received_on_time: state.received_on_time,
            effective_error: state.effective_error,
            deadline_ms,
        }
    }

    /// Row for a frame that never completed. Metadata is zeroed even if some
    /// fragments arrived.
    pub fn lost(frame_number: u32, penalty: f64, deadline_ms: f64) -> Self {
        FrameRecord {
            frame_number,
            component_count: 0,
            reconstruction_error: 0.0,
            size_bytes: 0,
            generation_timestamp: 0.0,
            reception_timestamp: 0.0,
            delay_ms: INCOMPLETE_DELAY_MS,
            received_on_time: false,
            effective_error: penalty,
            deadline_ms,
        }
    }
}

/// Events emitted by the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    /// A frame's last fragment arrived.
    FrameCompleted(FrameRecord),
    /// A frame was found lost at finalize.
    FrameLost(FrameRecord),
}

/// Result of [`Receiver::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeOutcome {
    pub summary: StreamQoESummary,
    pub loss: LossReport,
    /// Present only for the call that completed the global tally.
    pub global: Option<GlobalQoESummary>,
}

// ─── Receiver ───────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Lifecycle {
    Active(StreamRegistration),
    Finalized(FinalizeOutcome),
}

/// Receiver state machine.
#[derive(Debug)]
pub struct Receiver {
    config: ReceiverConfig,
    tracker: ReassemblyTracker,
    aggregator: Arc<GlobalAggregator>,
    lifecycle: Option<Lifecycle>,
    events: Vec<ReceiverEvent>,
    stats: ReceiverStats,
}

impl Receiver {
    /// Build a receiver and register its stream with `aggregator`.
    pub fn new(
        config: ReceiverConfig,
        aggregator: Arc<GlobalAggregator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = DeadlineClassifier::new(config.deadline_ms, config.max_penalty)?;
        let registration = aggregator.register();
        tracing::info!(
            stream = registration.stream_id(),
            deadline_ms = config.deadline_ms,
            expected_frames = config.expected_total_frames,
            "receiver initialized"
        );
        Ok(Receiver {
            config,
            tracker: ReassemblyTracker::new(classifier),
            aggregator,
            lifecycle: Some(Lifecycle::Active(registration)),
            events: Vec::new(),
            stats: ReceiverStats::default(),
        })
    }

    /// Process one arriving fragment.
    pub fn on_fragment(&mut self, frag: &FragmentDescriptor, reception_instant: f64) {
        if self.is_finalized() {
            tracing::debug!(
                frame = frag.frame_sequence_number,
                "fragment after finalize ignored"
            );
            return;
        }

        let ingest = self.tracker.ingest(frag, reception_instant);
        if ingest.count_mismatch {
            self.stats.inconsistent_fragment_counts += 1;
            tracing::warn!(
                frame = frag.frame_sequence_number,
                fragment_count = frag.fragment_count,
                "fragment count disagrees with first fragment of frame"
            );
        }

        match ingest.status {
            IngestStatus::Malformed => {
                self.stats.malformed_fragments += 1;
                tracing::warn!(
                    frame = frag.frame_sequence_number,
                    "malformed fragment dropped"
                );
                return;
            }
            IngestStatus::Duplicate => {
                self.stats.duplicate_fragments += 1;
                tracing::debug!(
                    frame = frag.frame_sequence_number,
                    index = frag.fragment_index,
                    "duplicate fragment ignored"
                );
                return;
            }
            IngestStatus::Pending | IngestStatus::Completed(_) => {}
        }

        self.stats.fragments_received += 1;
        self.stats.bytes_received += frag.payload_size as u64;
        if self.stats.first_arrival_at.is_none() {
            self.stats.first_arrival_at = Some(reception_instant);
            tracing::info!(at = reception_instant, "first fragment received");
        }

        if let IngestStatus::Completed(c) = ingest.status {
            self.stats.frames_completed += 1;
            let seq = frag.frame_sequence_number;
            if let Some(state) = self.tracker.get(seq) {
                self.events.push(ReceiverEvent::FrameCompleted(FrameRecord::completed(
                    seq,
                    state,
                    self.config.deadline_ms,
                )));
            }
            tracing::debug!(
                frame = seq,
                delay_ms = c.delay_ms,
                on_time = c.on_time,
                error = c.effective_error,
                "frame complete"
            );
        }
    }

    /// End the stream: detect losses, score it and contribute to the global
    /// tally. Idempotent.
    pub fn finalize(&mut self) -> FinalizeOutcome {
        let registration = match self.lifecycle.take() {
            Some(Lifecycle::Active(registration)) => registration,
            Some(Lifecycle::Finalized(outcome)) => {
                let repeat = FinalizeOutcome {
                    global: None,
                    ..outcome.clone()
                };
                self.lifecycle = Some(Lifecycle::Finalized(outcome));
                return repeat;
            }
            // Only reachable if a previous finalize panicked mid-way.
            None => {
                return FinalizeOutcome {
                    summary: self.summary(),
                    loss: LossReport::default(),
                    global: None,
                }
            }
        };

        let expected = self.config.expected_total_frames;
        let loss = detect_lost_frames(&mut self.tracker, expected);
        let penalty = self.config.max_penalty;
        let deadline = self.config.deadline_ms;
        let mut lost: Vec<u32> = loss.absent.iter().chain(&loss.partial).copied().collect();
        lost.sort_unstable();
        self.events.extend(
            lost.into_iter()
                .map(|seq| ReceiverEvent::FrameLost(FrameRecord::lost(seq, penalty, deadline))),
        );

        let summary = self.summary();
        tracing::info!(
            stream = registration.stream_id(),
            expected = summary.total_frames,
            received = summary.received_frames,
            on_time = summary.on_time_frames,
            late = summary.late_frames,
            lost = summary.lost_frames,
            mean_error = summary.mean_error,
            avg_delay_ms = summary.avg_delay_ms,
            delay_reliability = summary.delay_reliability,
            satisfied = summary.user_satisfied,
            "stream QoE"
        );

        let global = self.aggregator.contribute(registration, &summary);
        let outcome = FinalizeOutcome {
            summary,
            loss,
            global,
        };
        self.lifecycle = Some(Lifecycle::Finalized(FinalizeOutcome {
            global: None,
            ..outcome.clone()
        }));
        outcome
    }

    fn summary(&self) -> StreamQoESummary {
        StreamQoESummary::compute(
            &self.tracker,
            self.config.expected_total_frames,
            self.config.reliability_threshold,
        )
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.lifecycle, Some(Lifecycle::Finalized(_)))
    }

    /// Drain queued per-frame events.
    pub fn drain_events(&mut self) -> impl Iterator<Item = ReceiverEvent> + '_ {
        self.events.drain(..)
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn tracker(&self) -> &ReassemblyTracker {
        &self.tracker
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }
}
