//! # Pacing Scheduler
//!
//! Decides when the next frame goes out. Each tick advances exactly one frame
//! and schedules the following one `1/fps + jitter` seconds later, with the
//! jitter drawn in milliseconds from a [`JitterSampler`]. Once the last frame
//! has been emitted the scheduler stops for good.

use crate::error::ConfigError;
use crate::jitter::{JitterConfig, JitterSampler};

/// Frame-rate pacer with jittered intervals.
#[derive(Debug)]
pub struct Pacer {
    fps: f64,
    start_offset: f64,
    jitter: JitterSampler,
    frame_index: usize,
    total_frames: usize,
    next_send_at: Option<f64>,
}

impl Pacer {
    /// `start_offset` (seconds) delays the first frame beyond one interval.
    pub fn new(
        fps: f64,
        start_offset: f64,
        jitter: JitterConfig,
        total_frames: usize,
    ) -> Result<Self, ConfigError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ConfigError::InvalidFrameRate(fps));
        }
        Ok(Pacer {
            fps,
            start_offset: start_offset.max(0.0),
            jitter: JitterSampler::new(jitter)?,
            frame_index: 0,
            total_frames,
            next_send_at: None,
        })
    }

    /// One jittered frame interval in seconds. Never negative, so send
    /// instants are monotonic even with wide jitter bounds.
    pub fn next_interval(&mut self) -> f64 {
        let jitter_ms = self.jitter.sample();
        (1.0 / self.fps + jitter_ms / 1000.0).max(0.0)
    }

    /// Arm the first send instant. Returns `None` when there is nothing to send.
    pub fn start(&mut self, now: f64) -> Option<f64> {
        if self.frame_index >= self.total_frames {
            self.next_send_at = None;
            return None;
        }
        let first = now + self.start_offset + self.next_interval();
        self.next_send_at = Some(first);
        Some(first)
    }

    /// If a frame is due at `now`, return its catalog index and schedule the
    /// next one relative to `now`.
    pub fn tick(&mut self, now: f64) -> Option<usize> {
        let due = self.next_send_at?;
        if now < due {
            return None;
        }

        let index = self.frame_index;
        self.frame_index += 1;
        self.next_send_at = if self.frame_index < self.total_frames {
            Some(now + self.next_interval())
        } else {
            None
        };
        Some(index)
    }

    /// Cancel any pending send instant.
    pub fn stop(&mut self) {
        self.next_send_at = None;
    }

    pub fn next_send_at(&self) -> Option<f64> {
        self.next_send_at
    }

    /// Frames emitted so far.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn is_finished(&self) -> bool {
        self.frame_index >= self.total_frames
    }
}
