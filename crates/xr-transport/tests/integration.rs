//! # Integration tests: Sender ↔ Receiver through the wire format
//!
//! Sender → datagram encode → (impairment) → datagram decode → Receiver →
//! finalize → global summary.
//!
//! No actual network I/O: the "network" is a list of `(arrival, Bytes)`
//! pairs. Delay and loss are applied in the middle.

use std::sync::Arc;

use bytes::Bytes;
use tracing_subscriber::EnvFilter;
use xr_transport::aggregate::GlobalAggregator;
use xr_transport::catalog::{ComponentFilter, FrameCatalog, FrameDescriptor};
use xr_transport::deadline::DEFAULT_MAX_PENALTY;
use xr_transport::directory::{PeerId, StaticDirectory};
use xr_transport::jitter::JitterConfig;
use xr_transport::receiver::{FinalizeOutcome, Receiver, ReceiverConfig, ReceiverEvent};
use xr_transport::sender::{Sender, SenderConfig};
use xr_transport::wire::Datagram;

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Route crate logs through the test harness. `RUST_LOG=debug` shows the
/// per-frame trace of a failing test.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn catalog(sizes: &[u32]) -> FrameCatalog {
    FrameCatalog::from_frames(
        sizes.iter().enumerate().map(|(i, &size)| FrameDescriptor {
            sequence_number: i as u32 + 1,
            component_count: 10,
            reconstruction_error: 2.0,
            size_bytes: size,
        }),
        ComponentFilter::All,
    )
    .unwrap()
}

fn directory() -> StaticDirectory {
    let mut dir = StaticDirectory::new();
    dir.insert("ue0", PeerId(0));
    dir
}

fn sender(sizes: &[u32]) -> Sender {
    init_tracing();
    Sender::new(
        SenderConfig {
            fps: 10.0,
            jitter: JitterConfig::none(),
            max_payload_size: 100,
            destination: "ue0".into(),
            ..Default::default()
        },
        catalog(sizes),
    )
    .unwrap()
}

/// Run the sender to completion. `link` maps (frame, fragment index, send
/// instant) to an arrival instant, or `None` to drop the datagram.
fn transmit(
    tx: &mut Sender,
    mut link: impl FnMut(u32, u16, f64) -> Option<f64>,
) -> Vec<(f64, Bytes)> {
    let mut wire = Vec::new();
    let Some(mut now) = tx.start(0.0, &directory()).unwrap() else {
        return wire;
    };
    loop {
        let Some(burst) = tx.poll(now).unwrap() else {
            break;
        };
        for frag in &burst.fragments {
            if let Some(arrival) = link(frag.frame_sequence_number, frag.fragment_index, now) {
                wire.push((arrival, Datagram::from_fragment(frag).encode().freeze()));
            }
        }
        match burst.next_send_at {
            Some(next) => now = next,
            None => break,
        }
    }
    wire.sort_by(|a, b| a.0.total_cmp(&b.0));
    wire
}

fn deliver(rx: &mut Receiver, wire: Vec<(f64, Bytes)>) {
    for (arrival, bytes) in wire {
        let datagram = Datagram::decode(bytes).expect("valid datagram");
        rx.on_fragment(&datagram.to_fragment(), arrival);
    }
}

fn run_stream(
    sizes: &[u32],
    config: ReceiverConfig,
    aggregator: &Arc<GlobalAggregator>,
    link: impl FnMut(u32, u16, f64) -> Option<f64>,
) -> (Receiver, FinalizeOutcome) {
    let mut rx = Receiver::new(config, Arc::clone(aggregator)).unwrap();
    let mut tx = sender(sizes);
    let wire = transmit(&mut tx, link);
    deliver(&mut rx, wire);
    let outcome = rx.finalize();
    (rx, outcome)
}

// ─── Single Stream ──────────────────────────────────────────────────────────

#[test]
fn late_multi_fragment_frame_scores_penalty() {
    let agg = Arc::new(GlobalAggregator::new());
    let config = ReceiverConfig {
        expected_total_frames: 3,
        reliability_threshold: 0.5,
        ..Default::default()
    };
    // Frame 2's middle fragment is held up by 50 ms; everything else takes 5 ms.
    let (mut rx, outcome) = run_stream(&[100, 250, 50], config, &agg, |frame, index, sent| {
        Some(if frame == 2 && index == 1 { sent + 0.050 } else { sent + 0.005 })
    });

    let s = &outcome.summary;
    assert_eq!(s.received_frames, 3);
    assert_eq!(s.on_time_frames, 2);
    assert_eq!(s.late_frames, 1);
    assert!((s.mean_error - (2.0 + DEFAULT_MAX_PENALTY + 2.0) / 3.0).abs() < 1e-9);
    assert!(s.user_satisfied);

    let completed: Vec<_> = rx
        .drain_events()
        .filter_map(|e| match e {
            ReceiverEvent::FrameCompleted(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(completed.len(), 3);
    let late = completed.iter().find(|r| r.frame_number == 2).unwrap();
    assert!((late.delay_ms - 50.0).abs() < 1e-6);
    assert!(!late.received_on_time);
    assert_eq!(late.effective_error, DEFAULT_MAX_PENALTY);

    assert_eq!(rx.stats().fragments_received, 5);
    assert_eq!(rx.stats().frames_completed, 3);
    assert_eq!(outcome.global.unwrap().stream_count, 1);
}

#[test]
fn dropped_fragment_makes_frame_lost() {
    let agg = Arc::new(GlobalAggregator::new());
    let config = ReceiverConfig {
        expected_total_frames: 4,
        reliability_threshold: 0.99,
        ..Default::default()
    };
    let (_, outcome) = run_stream(&[100, 250, 50, 80], config, &agg, |frame, index, sent| {
        if frame == 2 && index == 2 {
            None
        } else {
            Some(sent + 0.001)
        }
    });

    let s = &outcome.summary;
    assert_eq!(s.lost_frames, 1);
    assert_eq!(s.partial_frames, 1);
    assert_eq!(outcome.loss.partial, vec![2]);
    assert!((s.delivery_ratio + s.loss_ratio - 1.0).abs() < 1e-12);
    assert!(!s.user_satisfied);
}

#[test]
fn expected_frames_beyond_catalog_are_lost() {
    let agg = Arc::new(GlobalAggregator::new());
    let config = ReceiverConfig {
        expected_total_frames: 5,
        ..Default::default()
    };
    let (_, outcome) = run_stream(&[100, 100], config, &agg, |_, _, sent| Some(sent + 0.001));
    assert_eq!(outcome.summary.received_frames, 2);
    assert_eq!(outcome.loss.absent, vec![3, 4, 5]);
    assert!((outcome.summary.mean_error - (2.0 * 2.0 + 3.0 * DEFAULT_MAX_PENALTY) / 5.0).abs() < 1e-9);
}

#[test]
fn nothing_arrives_mean_is_penalty() {
    let agg = Arc::new(GlobalAggregator::new());
    let config = ReceiverConfig {
        expected_total_frames: 3,
        ..Default::default()
    };
    let (rx, outcome) = run_stream(&[100, 100, 100], config, &agg, |_, _, _| None);
    assert_eq!(outcome.summary.mean_error, DEFAULT_MAX_PENALTY);
    assert_eq!(outcome.summary.loss_ratio, 1.0);
    assert!(rx.stats().first_arrival_at.is_none());
}

// ─── Multiple Streams ───────────────────────────────────────────────────────

#[test]
fn global_summary_across_streams() {
    let agg = Arc::new(GlobalAggregator::new());
    let config = ReceiverConfig {
        expected_total_frames: 10,
        reliability_threshold: 0.8,
        ..Default::default()
    };
    let sizes = [120u32; 10];

    // All three streams register before any of them finishes.
    let mut perfect = Receiver::new(config, Arc::clone(&agg)).unwrap();
    let mut lossy = Receiver::new(config, Arc::clone(&agg)).unwrap();
    let mut idle = Receiver::new(config, Arc::clone(&agg)).unwrap();

    let wire = transmit(&mut sender(&sizes), |_, _, sent| Some(sent + 0.002));
    deliver(&mut perfect, wire);
    let perfect = perfect.finalize();
    assert!(perfect.global.is_none(), "other streams not yet finished");
    assert!(perfect.summary.user_satisfied);

    let wire = transmit(&mut sender(&sizes), |frame, _, sent| {
        (frame <= 7).then_some(sent + 0.002)
    });
    deliver(&mut lossy, wire);
    let lossy = lossy.finalize();
    assert!(lossy.global.is_none());
    assert!((lossy.summary.delay_reliability - 0.7).abs() < 1e-12);
    assert!(!lossy.summary.user_satisfied);

    let last = idle.finalize();
    let global = last.global.expect("last finisher publishes");
    assert_eq!(global.stream_count, 3);
    assert_eq!(global.satisfied_stream_count, 1);
    assert_eq!(global.total_expected_frames, 30);
    assert_eq!(global.total_on_time_frames, 17);
    assert_eq!(agg.published(), Some(&global));
}

#[test]
fn concurrent_streams_publish_once() {
    let agg = Arc::new(GlobalAggregator::new());
    let config = ReceiverConfig {
        expected_total_frames: 20,
        reliability_threshold: 0.9,
        ..Default::default()
    };
    let receivers: Vec<_> = (0..8)
        .map(|_| Receiver::new(config, Arc::clone(&agg)).unwrap())
        .collect();

    let published = std::thread::scope(|scope| {
        let handles: Vec<_> = receivers
            .into_iter()
            .enumerate()
            .map(|(i, mut rx)| {
                scope.spawn(move || {
                    let mut tx = sender(&[300u32; 20]);
                    let wire = transmit(&mut tx, |frame, _, sent| {
                        (frame as usize % 8 != i).then_some(sent + 0.003)
                    });
                    deliver(&mut rx, wire);
                    rx.finalize().global
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert_eq!(published.len(), 1);
    assert_eq!(published[0].stream_count, 8);
    assert_eq!(published[0].total_expected_frames, 160);
}
