//! Destination lookup.
//!
//! A sender names its destination by address string; the host decides which
//! peer that is. The directory is injected so hosts can back it with whatever
//! registry they have.

use std::collections::HashMap;
use std::fmt;

/// Opaque identifier of a receiving peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Resolves destination addresses to peers.
pub trait PeerDirectory {
    fn resolve(&self, address: &str) -> Option<PeerId>;
}

/// Fixed address table.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: HashMap<String, PeerId>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `address`; a later insert for the same address wins.
    pub fn insert(&mut self, address: impl Into<String>, peer: PeerId) {
        self.entries.insert(address.into(), peer);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PeerDirectory for StaticDirectory {
    fn resolve(&self, address: &str) -> Option<PeerId> {
        self.entries.get(address.trim()).copied()
    }
}
