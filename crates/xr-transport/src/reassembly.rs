//! # Reassembly Tracker
//!
//! Receiver-side map from frame number to completion state. Fragments are
//! counted, not stored: the receiver only needs to know *when* the last
//! fragment of a frame arrives, not which bytes it carried.
//!
//! - The first fragment seen for a frame creates its state and fixes the
//!   frame's fragment count and metadata.
//! - Each later fragment bumps the counter; the one that makes it equal to
//!   the fragment count completes the frame and is classified exactly once.
//! - Fragments for a full or completed frame are duplicates and change
//!   nothing.
//!
//! Entries are never removed. A frame whose last fragment never arrives
//! stays incomplete and is later counted as lost.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::deadline::{Classification, DeadlineClassifier};
use crate::fragment::FragmentDescriptor;

/// Value written in place of a delay for frames that never completed.
pub const INCOMPLETE_DELAY_MS: f64 = -1.0;

// ─── Frame State ────────────────────────────────────────────────────────────

/// Reception state of one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReceptionState {
    pub component_count: u32,
    pub reconstruction_error: f64,
    pub size_bytes: u32,
    pub generation_timestamp: f64,
    pub first_arrival_timestamp: f64,
    pub fragments_received: u16,
    pub fragment_count: u16,
    /// End-to-end delay, set once when the frame completes.
    pub delay_ms: Option<f64>,
    /// Reception instant of the completing fragment.
    pub completed_at: Option<f64>,
    pub received_on_time: bool,
    pub effective_error: f64,
}

impl FrameReceptionState {
    fn first_fragment(frag: &FragmentDescriptor, reception_instant: f64, penalty: f64) -> Self {
        FrameReceptionState {
            component_count: frag.component_count,
            reconstruction_error: frag.reconstruction_error,
            size_bytes: frag.frame_size_bytes,
            generation_timestamp: frag.generation_timestamp,
            first_arrival_timestamp: reception_instant,
            fragments_received: 1,
            fragment_count: frag.fragment_count,
            delay_ms: None,
            completed_at: None,
            received_on_time: false,
            effective_error: penalty,
        }
    }

    /// State for a frame that never produced a single fragment.
    pub fn lost(penalty: f64) -> Self {
        FrameReceptionState {
            component_count: 0,
            reconstruction_error: 0.0,
            size_bytes: 0,
            generation_timestamp: 0.0,
            first_arrival_timestamp: 0.0,
            fragments_received: 0,
            fragment_count: 0,
            delay_ms: None,
            completed_at: None,
            received_on_time: false,
            effective_error: penalty,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.delay_ms.is_some()
    }

    /// Delay, or [`INCOMPLETE_DELAY_MS`] if the frame never completed.
    pub fn delay_ms_or_sentinel(&self) -> f64 {
        self.delay_ms.unwrap_or(INCOMPLETE_DELAY_MS)
    }

    fn complete(&mut self, c: Classification, reception_instant: f64) {
        self.delay_ms = Some(c.delay_ms);
        self.completed_at = Some(reception_instant);
        self.received_on_time = c.on_time;
        self.effective_error = c.effective_error;
    }
}

// ─── Ingest Result ──────────────────────────────────────────────────────────

/// What a single fragment did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestStatus {
    /// Counted; frame still waiting for more fragments.
    Pending,
    /// Counted; this fragment completed the frame.
    Completed(Classification),
    /// Ignored: frame already complete or already holds all its fragments.
    Duplicate,
    /// Ignored: the fragment cannot belong to any frame (zero count).
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ingest {
    pub status: IngestStatus,
    /// The fragment's count disagreed with the frame's first-seen count.
    pub count_mismatch: bool,
}

// ─── Tracker ────────────────────────────────────────────────────────────────

/// Per-stream reassembly state.
#[derive(Debug)]
pub struct ReassemblyTracker {
    frames: BTreeMap<u32, FrameReceptionState>,
    classifier: DeadlineClassifier,
}

impl ReassemblyTracker {
    pub fn new(classifier: DeadlineClassifier) -> Self {
        ReassemblyTracker {
            frames: BTreeMap::new(),
            classifier,
        }
    }

    /// Account for one arriving fragment.
    pub fn ingest(&mut self, frag: &FragmentDescriptor, reception_instant: f64) -> Ingest {
        if frag.fragment_count == 0 {
            return Ingest {
                status: IngestStatus::Malformed,
                count_mismatch: false,
            };
        }

        let penalty = self.classifier.max_penalty();
        let (state, count_mismatch) = match self.frames.entry(frag.frame_sequence_number) {
            Entry::Vacant(slot) => (
                slot.insert(FrameReceptionState::first_fragment(
                    frag,
                    reception_instant,
                    penalty,
                )),
                false,
            ),
            Entry::Occupied(slot) => {
                let state = slot.into_mut();
                let count_mismatch = frag.fragment_count != state.fragment_count;
                if state.is_complete() || state.fragments_received >= state.fragment_count {
                    return Ingest {
                        status: IngestStatus::Duplicate,
                        count_mismatch,
                    };
                }
                state.fragments_received += 1;
                (state, count_mismatch)
            }
        };

        let status = if state.fragments_received == state.fragment_count {
            let c = self.classifier.classify(
                state.generation_timestamp,
                reception_instant,
                state.reconstruction_error,
            );
            state.complete(c, reception_instant);
            IngestStatus::Completed(c)
        } else {
            IngestStatus::Pending
        };
        Ingest {
            status,
            count_mismatch,
        }
    }

    /// Insert a synthesized state for a frame number that was never seen.
    /// Existing entries are left untouched; returns whether it inserted.
    pub(crate) fn insert_absent(&mut self, sequence_number: u32) -> bool {
        if self.frames.contains_key(&sequence_number) {
            return false;
        }
        self.frames.insert(
            sequence_number,
            FrameReceptionState::lost(self.classifier.max_penalty()),
        );
        true
    }

    pub fn get(&self, sequence_number: u32) -> Option<&FrameReceptionState> {
        self.frames.get(&sequence_number)
    }

    pub fn contains(&self, sequence_number: u32) -> bool {
        self.frames.contains_key(&sequence_number)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames in sequence-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &FrameReceptionState)> + '_ {
        self.frames.iter().map(|(&seq, state)| (seq, state))
    }

    pub fn classifier(&self) -> &DeadlineClassifier {
        &self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::DEFAULT_MAX_PENALTY;

    fn tracker(deadline_ms: f64) -> ReassemblyTracker {
        ReassemblyTracker::new(DeadlineClassifier::new(deadline_ms, DEFAULT_MAX_PENALTY).unwrap())
    }

    fn frag(seq: u32, index: u16, count: u16, gen: f64) -> FragmentDescriptor {
        FragmentDescriptor {
            frame_sequence_number: seq,
            fragment_index: index,
            fragment_count: count,
            payload_size: 100,
            generation_timestamp: gen,
            component_count: 20,
            reconstruction_error: 2.5,
            frame_size_bytes: 100 * count as u32,
        }
    }

    // ─── Completion ─────────────────────────────────────────────────────

    #[test]
    fn single_fragment_frame_completes_immediately() {
        let mut t = tracker(40.0);
        let r = t.ingest(&frag(1, 0, 1, 0.0), 0.010);
        assert!(matches!(r.status, IngestStatus::Completed(c) if c.on_time));
        let s = t.get(1).unwrap();
        assert!(s.is_complete());
        assert_eq!(s.effective_error, 2.5);
        assert_eq!(s.completed_at, Some(0.010));
    }

    #[test]
    fn completes_on_last_fragment_in_any_order() {
        let mut t = tracker(40.0);
        assert_eq!(t.ingest(&frag(2, 2, 3, 0.0), 0.010).status, IngestStatus::Pending);
        assert_eq!(t.ingest(&frag(2, 0, 3, 0.0), 0.020).status, IngestStatus::Pending);
        let r = t.ingest(&frag(2, 1, 3, 0.0), 0.050);
        match r.status {
            IngestStatus::Completed(c) => {
                assert!((c.delay_ms - 50.0).abs() < 1e-9);
                assert!(!c.on_time);
                assert_eq!(c.effective_error, DEFAULT_MAX_PENALTY);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        let s = t.get(2).unwrap();
        assert_eq!(s.fragments_received, 3);
        assert_eq!(s.first_arrival_timestamp, 0.010);
    }

    #[test]
    fn metadata_comes_from_first_fragment() {
        let mut t = tracker(40.0);
        let mut first = frag(5, 1, 2, 0.25);
        first.reconstruction_error = 7.0;
        t.ingest(&first, 0.26);
        let mut second = frag(5, 0, 2, 0.99);
        second.reconstruction_error = 99.0;
        t.ingest(&second, 0.27);

        let s = t.get(5).unwrap();
        assert_eq!(s.reconstruction_error, 7.0);
        assert_eq!(s.generation_timestamp, 0.25);
        assert!(s.received_on_time);
        assert_eq!(s.effective_error, 7.0);
    }

    // ─── Idempotent Completion ──────────────────────────────────────────

    #[test]
    fn fragments_after_completion_are_duplicates() {
        let mut t = tracker(40.0);
        t.ingest(&frag(1, 0, 2, 0.0), 0.001);
        t.ingest(&frag(1, 1, 2, 0.0), 0.002);
        let before = t.get(1).unwrap().clone();

        let r = t.ingest(&frag(1, 1, 2, 0.0), 5.0);
        assert_eq!(r.status, IngestStatus::Duplicate);
        assert_eq!(t.get(1).unwrap(), &before);
    }

    #[test]
    fn inconsistent_count_cannot_overflow_first_seen_count() {
        let mut t = tracker(40.0);
        t.ingest(&frag(3, 0, 2, 0.0), 0.001);
        // Claims 5 fragments: counted against the first-seen 2.
        let r = t.ingest(&frag(3, 1, 5, 0.0), 0.002);
        assert!(r.count_mismatch);
        assert!(matches!(r.status, IngestStatus::Completed(_)));

        let r = t.ingest(&frag(3, 2, 5, 0.0), 0.003);
        assert!(r.count_mismatch);
        assert_eq!(r.status, IngestStatus::Duplicate);
        assert_eq!(t.get(3).unwrap().fragments_received, 2);
    }

    #[test]
    fn zero_fragment_count_is_malformed() {
        let mut t = tracker(40.0);
        let r = t.ingest(&frag(1, 0, 0, 0.0), 0.0);
        assert_eq!(r.status, IngestStatus::Malformed);
        assert!(t.is_empty());
    }

    // ─── Incomplete Frames ──────────────────────────────────────────────

    #[test]
    fn partial_frame_stays_incomplete() {
        let mut t = tracker(40.0);
        t.ingest(&frag(4, 0, 3, 0.0), 0.001);
        let s = t.get(4).unwrap();
        assert!(!s.is_complete());
        assert_eq!(s.delay_ms_or_sentinel(), INCOMPLETE_DELAY_MS);
        assert_eq!(s.effective_error, DEFAULT_MAX_PENALTY);
        assert!(!s.received_on_time);
    }

    #[test]
    fn insert_absent_leaves_existing_entries() {
        let mut t = tracker(40.0);
        t.ingest(&frag(1, 0, 2, 0.0), 0.001);
        assert!(!t.insert_absent(1));
        assert_eq!(t.get(1).unwrap().fragments_received, 1);
        assert!(t.insert_absent(2));
        assert_eq!(t.get(2).unwrap(), &FrameReceptionState::lost(DEFAULT_MAX_PENALTY));
    }
}
