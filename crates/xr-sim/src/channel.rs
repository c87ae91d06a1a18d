//! Impaired link model between one sender and one receiver.
//!
//! Each datagram is serialized onto the link at the current rate (queueing
//! behind earlier datagrams), then either dropped or delivered after the
//! current one-way delay plus a per-datagram jitter. Conditions come from a
//! [`Timeline`] so they drift over the run.
//!
//! Arrivals are held in a [`DeliveryQueue`] ordered by arrival instant;
//! jitter can reorder datagrams.
//!
//! All randomness is seeded; the same seed and inputs give identical
//! arrivals.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use serde::Serialize;

use crate::scenario::Timeline;

/// Link counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelStats {
    pub datagrams_offered: u64,
    pub datagrams_dropped: u64,
    pub datagrams_delivered: u64,
    pub bytes_delivered: u64,
    /// Longest time a datagram waited for the link to free up.
    pub max_queueing_ms: f64,
}

impl ChannelStats {
    pub fn loss_ratio(&self) -> f64 {
        if self.datagrams_offered == 0 {
            0.0
        } else {
            self.datagrams_dropped as f64 / self.datagrams_offered as f64
        }
    }
}

/// One direction of an impaired link.
#[derive(Debug)]
pub struct Channel {
    timeline: Timeline,
    rng: StdRng,
    busy_until: f64,
    stats: ChannelStats,
}

impl Channel {
    pub fn new(timeline: Timeline, seed: u64) -> Self {
        Self {
            timeline,
            rng: StdRng::seed_from_u64(seed),
            busy_until: 0.0,
            stats: ChannelStats::default(),
        }
    }

    /// Offer `len` bytes to the link at `send_at` seconds. Returns the
    /// arrival instant, or `None` if the datagram is lost.
    pub fn transmit(&mut self, send_at: f64, len: usize) -> Option<f64> {
        self.stats.datagrams_offered += 1;
        let c = self.timeline.at(send_at);

        let start = send_at.max(self.busy_until);
        let serialization = match c.rate_kbit {
            Some(rate) => (len * 8) as f64 / (rate * 1000.0),
            None => 0.0,
        };
        self.busy_until = start + serialization;
        self.stats.max_queueing_ms = self.stats.max_queueing_ms.max((start - send_at) * 1000.0);

        // The datagram occupied the link even if it is lost on the way.
        if c.loss_percent > 0.0 && self.rng.random::<f64>() * 100.0 < c.loss_percent {
            self.stats.datagrams_dropped += 1;
            return None;
        }

        let jitter_ms = if c.packet_jitter_ms > 0.0 {
            self.rng.random::<f64>() * c.packet_jitter_ms
        } else {
            0.0
        };
        self.stats.datagrams_delivered += 1;
        self.stats.bytes_delivered += len as u64;
        Some(self.busy_until + (c.delay_ms + jitter_ms) / 1000.0)
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}

// ─── Delivery Queue ─────────────────────────────────────────────────────────

#[derive(Debug)]
struct Scheduled {
    at: f64,
    order: u64,
    datagram: Bytes,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed: BinaryHeap is a max-heap and the earliest arrival must pop
    // first. Ties keep insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Datagrams in flight, ordered by arrival instant.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    heap: BinaryHeap<Scheduled>,
    next_order: u64,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: f64, datagram: Bytes) {
        self.heap.push(Scheduled {
            at,
            order: self.next_order,
            datagram,
        });
        self.next_order += 1;
    }

    /// Pop the earliest datagram arriving at or before `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<(f64, Bytes)> {
        if self.heap.peek()?.at > now {
            return None;
        }
        self.heap.pop().map(|s| (s.at, s.datagram))
    }

    pub fn next_arrival(&self) -> Option<f64> {
        self.heap.peek().map(|s| s.at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{LinkConditions, LinkProfile, ScenarioFrame};
    use std::time::Duration;

    fn ideal(delay_ms: f64) -> Channel {
        Channel::new(
            Timeline::generate(LinkProfile::ideal(delay_ms), 1, Duration::from_secs(1)),
            1,
        )
    }

    #[test]
    fn ideal_link_adds_fixed_delay() {
        let mut ch = ideal(5.0);
        let at = ch.transmit(1.0, 1400).unwrap();
        assert!((at - 1.005).abs() < 1e-12);
        assert_eq!(ch.stats().datagrams_delivered, 1);
        assert_eq!(ch.stats().bytes_delivered, 1400);
    }

    #[test]
    fn rate_limit_serializes_back_to_back_datagrams() {
        let profile = LinkProfile {
            min_rate_kbit: 1_000,
            max_rate_kbit: 1_000,
            ..LinkProfile::ideal(0.0)
        };
        let mut ch = Channel::new(Timeline::generate(profile, 1, Duration::from_secs(1)), 1);
        // 1000 bytes at 1 Mbit/s = 8 ms each.
        let a = ch.transmit(0.0, 1000).unwrap();
        let b = ch.transmit(0.0, 1000).unwrap();
        assert!((a - 0.008).abs() < 1e-12);
        assert!((b - 0.016).abs() < 1e-12);
        assert!((ch.stats().max_queueing_ms - 8.0).abs() < 1e-9);
    }

    #[test]
    fn total_loss_drops_everything() {
        let frames = vec![ScenarioFrame {
            t: Duration::ZERO,
            conditions: LinkConditions {
                delay_ms: 1.0,
                packet_jitter_ms: 0.0,
                loss_percent: 100.0,
                rate_kbit: None,
            },
        }];
        let mut ch = Channel::new(Timeline::new(frames), 3);
        assert!((0..50).all(|i| ch.transmit(i as f64 * 0.01, 100).is_none()));
        assert_eq!(ch.stats().datagrams_dropped, 50);
        assert_eq!(ch.stats().loss_ratio(), 1.0);
    }

    #[test]
    fn same_seed_same_arrivals() {
        let make = || {
            Channel::new(
                Timeline::generate(LinkProfile::default(), 11, Duration::from_secs(2)),
                5,
            )
        };
        let (mut a, mut b) = (make(), make());
        for i in 0..200 {
            let t = i as f64 / 100.0;
            assert_eq!(a.transmit(t, 1200), b.transmit(t, 1200));
        }
    }

    #[test]
    fn queue_pops_in_arrival_order() {
        let mut q = DeliveryQueue::new();
        q.push(0.3, Bytes::from_static(b"c"));
        q.push(0.1, Bytes::from_static(b"a"));
        q.push(0.2, Bytes::from_static(b"b"));
        q.push(0.2, Bytes::from_static(b"b2"));

        assert_eq!(q.next_arrival(), Some(0.1));
        assert!(q.pop_due(0.05).is_none());
        let order: Vec<_> = std::iter::from_fn(|| q.pop_due(0.25)).map(|(_, d)| d).collect();
        assert_eq!(order, vec!["a", "b", "b2"]);
        assert_eq!(q.len(), 1);
    }
}
