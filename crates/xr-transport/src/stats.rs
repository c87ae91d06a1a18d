//! # Transport Statistics
//!
//! Plain counters for the sender and receiver state machines. Both serialize
//! to JSON for the host's result files.

use serde::Serialize;

// ─── Sender Stats ───────────────────────────────────────────────────────────

/// Sender-side counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SenderStats {
    /// Frames fragmented and handed to the transport.
    pub frames_sent: u64,
    /// Fragments handed to the transport.
    pub fragments_sent: u64,
    /// Payload bytes handed to the transport (headers excluded).
    pub bytes_sent: u64,
    /// Frames that could not be fragmented.
    pub frames_rejected: u64,
}

impl SenderStats {
    /// Mean fragments per sent frame.
    pub fn fragments_per_frame(&self) -> f64 {
        if self.frames_sent == 0 {
            0.0
        } else {
            self.fragments_sent as f64 / self.frames_sent as f64
        }
    }
}

// ─── Receiver Stats ─────────────────────────────────────────────────────────

/// Receiver-side counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReceiverStats {
    /// Fragments accepted into reassembly.
    pub fragments_received: u64,
    /// Payload bytes of accepted fragments.
    pub bytes_received: u64,
    /// Fragments ignored because their frame was already complete or full.
    pub duplicate_fragments: u64,
    /// Fragments whose fragment count disagreed with the first-seen one.
    pub inconsistent_fragment_counts: u64,
    /// Fragments dropped as malformed (e.g. zero fragment count).
    pub malformed_fragments: u64,
    /// Frames that completed reassembly.
    pub frames_completed: u64,
    /// Reception instant of the very first fragment, in seconds.
    pub first_arrival_at: Option<f64>,
}

impl ReceiverStats {
    /// Share of arriving fragments that were ignored as duplicates.
    pub fn duplicate_ratio(&self) -> f64 {
        let total = self.fragments_received + self.duplicate_fragments;
        if total == 0 {
            0.0
        } else {
            self.duplicate_fragments as f64 / total as f64
        }
    }
}
