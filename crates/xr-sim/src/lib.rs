//! # xr-sim
//!
//! Multi-user host for `xr-transport`. Each user streams a compressed frame
//! catalog over its own impaired link to its own receiver; all receivers
//! feed one global QoE aggregator.
//!
//! - [`config`]: TOML configuration and defaults
//! - [`synth`]: Synthetic PCA sweep catalogs
//! - [`scenario`]: Random-walk link conditions
//! - [`channel`]: Impaired link and in-flight delivery queue
//! - [`runner`]: Per-user discrete-event loops on scoped threads
//! - [`output`]: Frame logs, QoE tables and JSON report

pub mod channel;
pub mod config;
pub mod output;
pub mod runner;
pub mod scenario;
pub mod synth;
