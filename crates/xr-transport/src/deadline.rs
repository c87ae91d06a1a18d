//! # Deadline Classifier
//!
//! Turns a completed frame's end-to-end delay into a QoE outcome. A frame is
//! on time iff its delay is at most the deadline (inclusive). Late frames are
//! scored as if they were maximally distorted: their effective error is the
//! configured penalty rather than their reconstruction error, so a single
//! error metric captures both fidelity and timeliness.

use serde::Serialize;

use crate::error::ConfigError;

/// Effective error assigned to late and lost frames by default.
pub const DEFAULT_MAX_PENALTY: f64 = 1000.0;

/// Outcome for one completed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub delay_ms: f64,
    pub on_time: bool,
    pub effective_error: f64,
}

/// Deadline check plus penalty substitution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeadlineClassifier {
    deadline_ms: f64,
    max_penalty: f64,
}

impl DeadlineClassifier {
    pub fn new(deadline_ms: f64, max_penalty: f64) -> Result<Self, ConfigError> {
        if !deadline_ms.is_finite() || deadline_ms < 0.0 {
            return Err(ConfigError::InvalidDeadline(deadline_ms));
        }
        if !max_penalty.is_finite() || max_penalty < 0.0 {
            return Err(ConfigError::InvalidPenalty(max_penalty));
        }
        Ok(DeadlineClassifier {
            deadline_ms,
            max_penalty,
        })
    }

    /// Classify a frame generated at `generation_timestamp` and completed at
    /// `reception_instant` (both in seconds).
    pub fn classify(
        &self,
        generation_timestamp: f64,
        reception_instant: f64,
        reconstruction_error: f64,
    ) -> Classification {
        let delay_ms = (reception_instant - generation_timestamp) * 1000.0;
        let on_time = delay_ms <= self.deadline_ms;
        Classification {
            delay_ms,
            on_time,
            effective_error: if on_time {
                reconstruction_error
            } else {
                self.max_penalty
            },
        }
    }

    pub fn deadline_ms(&self) -> f64 {
        self.deadline_ms
    }

    pub fn max_penalty(&self) -> f64 {
        self.max_penalty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(deadline_ms: f64) -> DeadlineClassifier {
        DeadlineClassifier::new(deadline_ms, DEFAULT_MAX_PENALTY).unwrap()
    }

    #[test]
    fn late_frame_gets_penalty() {
        let c = classifier(40.0).classify(0.000, 0.050, 3.0);
        assert!((c.delay_ms - 50.0).abs() < 1e-9);
        assert!(!c.on_time);
        assert_eq!(c.effective_error, DEFAULT_MAX_PENALTY);
    }

    #[test]
    fn on_time_frame_keeps_reconstruction_error() {
        let c = classifier(40.0).classify(1.0, 1.010, 3.0);
        assert!(c.on_time);
        assert_eq!(c.effective_error, 3.0);
    }

    #[test]
    fn deadline_boundary_is_inclusive() {
        // 0.5 s and 0.5 + 0.25 s are exact in binary, so delay is exactly 250 ms.
        let c = classifier(250.0).classify(0.5, 0.75, 2.0);
        assert_eq!(c.delay_ms, 250.0);
        assert!(c.on_time);
        assert_eq!(c.effective_error, 2.0);
    }

    #[test]
    fn custom_penalty_is_used() {
        let c = DeadlineClassifier::new(1.0, 42.0)
            .unwrap()
            .classify(0.0, 1.0, 0.0);
        assert_eq!(c.effective_error, 42.0);
    }

    #[test]
    fn negative_deadline_rejected() {
        assert_eq!(
            DeadlineClassifier::new(-1.0, DEFAULT_MAX_PENALTY).unwrap_err(),
            ConfigError::InvalidDeadline(-1.0)
        );
    }

    #[test]
    fn bad_penalty_rejected() {
        assert_eq!(
            DeadlineClassifier::new(40.0, -1.0).unwrap_err(),
            ConfigError::InvalidPenalty(-1.0)
        );
        assert!(matches!(
            DeadlineClassifier::new(40.0, f64::NAN),
            Err(ConfigError::InvalidPenalty(p)) if p.is_nan()
        ));
    }
}
