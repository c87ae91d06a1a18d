//! Error types for the XR transport.
//!
//! Configuration problems are fatal for the stream they belong to and are
//! reported as [`ConfigError`]. Late and lost frames are not errors; they are
//! ordinary classifications carried in the QoE summary.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or input data.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O failure while reading catalog input.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid configuration values or unusable input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("maximum payload size must be positive (got {0})")]
    InvalidPayloadSize(usize),

    #[error("frame {sequence_number} has zero size")]
    EmptyFrame { sequence_number: u32 },

    #[error("frame {sequence_number} needs {fragments} fragments, more than the header can carry")]
    TooManyFragments { sequence_number: u32, fragments: u64 },

    #[error("frame catalog contains no usable frames")]
    EmptyCatalog,

    #[error("jitter bounds are inverted (min {min} > max {max})")]
    InvalidJitterBounds { min: f64, max: f64 },

    #[error("jitter standard deviation must be finite and non-negative (got {0})")]
    InvalidJitterStdDev(f64),

    #[error("jitter mean must be finite (got {0} ms)")]
    InvalidJitterMean(f64),

    #[error("frame rate must be finite and positive (got {0})")]
    InvalidFrameRate(f64),

    #[error("deadline must be finite and non-negative (got {0} ms)")]
    InvalidDeadline(f64),

    #[error("reliability threshold must lie in [0, 1] (got {0})")]
    InvalidThreshold(f64),

    #[error("penalty must be finite and non-negative (got {0})")]
    InvalidPenalty(f64),

    #[error("could not resolve destination address {0:?}")]
    UnresolvedDestination(String),
}
