//! # xr-transport
//!
//! Real-time XR frame delivery over an unreliable datagram transport.
//!
//! The sender side fragments catalog frames into datagram-sized pieces and
//! paces them at a jittered frame rate. The receiver side reassembles
//! fragments by frame number, classifies each completed frame against a
//! latency deadline, infers losses at the end of the stream and scores the
//! stream's quality of experience. A shared [`aggregate::GlobalAggregator`]
//! folds every stream's score into one summary, published exactly once.
//!
//! ## Crate structure
//!
//! - [`catalog`]: Frame descriptors, CSV catalog loading, component filter
//! - [`jitter`]: Truncated-normal jitter sampler
//! - [`fragment`]: Fragmentation engine
//! - [`wire`]: Fixed-size fragment header and datagram codec
//! - [`pacing`]: Frame-rate pacing scheduler
//! - [`directory`]: Destination address → peer lookup
//! - [`sender`]: Sender state machine
//! - [`reassembly`]: Receiver-side completion tracking
//! - [`deadline`]: Per-frame delay classification
//! - [`loss`]: End-of-stream loss detection
//! - [`qoe`]: Per-stream QoE summary
//! - [`aggregate`]: Cross-stream aggregation
//! - [`receiver`]: Receiver state machine
//! - [`stats`]: Sender/receiver counters
//! - [`error`]: Error types
//!
//! Nothing in this crate owns a socket or a timer. Hosts feed it instants
//! (seconds, `f64`) and datagrams.

pub mod aggregate;
pub mod catalog;
pub mod deadline;
pub mod directory;
pub mod error;
pub mod fragment;
pub mod jitter;
pub mod loss;
pub mod pacing;
pub mod qoe;
pub mod reassembly;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod wire;

pub use error::{ConfigError, Error, Result};
