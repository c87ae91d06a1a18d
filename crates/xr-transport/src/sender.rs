//! # Sender State Machine
//!
//! Pure logic, no I/O. Walks the frame catalog at the paced frame rate and,
//! for every due tick, fragments the next frame into [`FragmentDescriptor`]s
//! for the host to put on the wire.
//!
//! ## Responsibilities
//!
//! 1. **Destination**: resolve the configured address through a [`PeerDirectory`]
//! 2. **Pacing**: one frame per tick, `1/fps + jitter` apart
//! 3. **Fragmentation**: split each frame at `max_payload_size`
//! 4. **Stats**: frames, fragments and bytes handed to the transport
//!
//! A frame that cannot be fragmented is a configuration error: the sender
//! stops and reports it instead of skipping ahead.

use crate::catalog::{FrameCatalog, FrameDescriptor};
use crate::directory::{PeerDirectory, PeerId};
use crate::error::ConfigError;
use crate::fragment::{fragment_frame, FragmentDescriptor};
use crate::jitter::JitterConfig;
use crate::pacing::Pacer;
use crate::stats::SenderStats;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Sender configuration parameters.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Frame rate in frames per second.
    pub fps: f64,
    /// Extra delay before the first frame, in seconds.
    pub start_offset_s: f64,
    /// Inter-frame jitter distribution.
    pub jitter: JitterConfig,
    /// Maximum payload per fragment (bytes).
    pub max_payload_size: usize,
    /// Destination address, resolved through the peer directory at start.
    pub destination: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            fps: 60.0,
            start_offset_s: 0.0,
            jitter: JitterConfig::default(),
            max_payload_size: 1400,
            destination: String::new(),
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_size == 0 {
            return Err(ConfigError::InvalidPayloadSize(self.max_payload_size));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(ConfigError::InvalidFrameRate(self.fps));
        }
        self.jitter.validate()
    }
}

// ─── Frame Burst ────────────────────────────────────────────────────────────

/// Everything emitted for one due tick.
#[derive(Debug, Clone)]
pub struct FrameBurst {
    pub frame: FrameDescriptor,
    pub destination: PeerId,
    pub fragments: Vec<FragmentDescriptor>,
    /// When the sender wants to be polled next, if ever.
    pub next_send_at: Option<f64>,
}

// ─── Sender ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SenderState {
    Idle,
    Running,
    Stopped,
}

/// Sender state machine.
#[derive(Debug)]
pub struct Sender {
    config: SenderConfig,
    catalog: FrameCatalog,
    pacer: Pacer,
    destination: Option<PeerId>,
    state: SenderState,
    stats: SenderStats,
}

impl Sender {
    pub fn new(config: SenderConfig, catalog: FrameCatalog) -> Result<Self, ConfigError> {
        config.validate()?;
        let pacer = Pacer::new(
            config.fps,
            config.start_offset_s,
            config.jitter,
            catalog.len(),
        )?;
        Ok(Sender {
            config,
            catalog,
            pacer,
            destination: None,
            state: SenderState::Idle,
            stats: SenderStats::default(),
        })
    }

    /// Resolve the destination and arm the first send instant.
    ///
    /// Returns the first send instant, or `None` if the catalog is empty.
    pub fn start(
        &mut self,
        now: f64,
        directory: &dyn PeerDirectory,
    ) -> Result<Option<f64>, ConfigError> {
        let peer = directory
            .resolve(&self.config.destination)
            .ok_or_else(|| ConfigError::UnresolvedDestination(self.config.destination.clone()))?;
        self.destination = Some(peer);
        self.state = SenderState::Running;

        let first = self.pacer.start(now);
        tracing::info!(
            frames = self.catalog.len(),
            fps = self.config.fps,
            destination = %self.config.destination,
            %peer,
            first_send_at = ?first,
            "sender started"
        );
        Ok(first)
    }

    /// Emit the next frame if one is due at `now`.
    pub fn poll(&mut self, now: f64) -> Result<Option<FrameBurst>, ConfigError> {
        if self.state != SenderState::Running {
            return Ok(None);
        }
        let Some(destination) = self.destination else {
            return Ok(None);
        };
        let Some(index) = self.pacer.tick(now) else {
            return Ok(None);
        };
        let Some(frame) = self.catalog.get(index).copied() else {
            return Ok(None);
        };

        let fragments = match fragment_frame(&frame, self.config.max_payload_size, now) {
            Ok(f) => f,
            Err(e) => {
                self.stats.frames_rejected += 1;
                self.stop();
                tracing::error!(frame = frame.sequence_number, error = %e, "cannot fragment frame, sender stopped");
                return Err(e);
            }
        };

        self.stats.frames_sent += 1;
        self.stats.fragments_sent += fragments.len() as u64;
        self.stats.bytes_sent += frame.size_bytes as u64;

        tracing::debug!(
            frame = frame.sequence_number,
            components = frame.component_count,
            size = frame.size_bytes,
            mse = frame.reconstruction_error,
            fragments = fragments.len(),
            "frame sent"
        );

        let next_send_at = self.pacer.next_send_at();
        if next_send_at.is_none() {
            tracing::info!(frames = self.stats.frames_sent, "all frames sent");
        }

        Ok(Some(FrameBurst {
            frame,
            destination,
            fragments,
            next_send_at,
        }))
    }

    /// Cancel pending sends. Idempotent.
    pub fn stop(&mut self) {
        self.pacer.stop();
        self.state = SenderState::Stopped;
    }

    pub fn next_send_at(&self) -> Option<f64> {
        match self.state {
            SenderState::Running => self.pacer.next_send_at(),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.pacer.is_finished() || self.state == SenderState::Stopped
    }

    pub fn destination(&self) -> Option<PeerId> {
        self.destination
    }

    pub fn catalog(&self) -> &FrameCatalog {
        &self.catalog
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }
}
