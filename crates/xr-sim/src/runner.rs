//! Multi-user run driver.
//!
//! Every user gets its own sender, impaired link and receiver, driven as a
//! discrete-event loop on its own thread. Simulated time is per stream; the
//! only shared state is the [`GlobalAggregator`], which every receiver
//! registers with before any stream starts.
//!
//! A stream whose sender fails (unresolvable destination, unplayable frame)
//! stops sending but still finalizes its receiver, so the global summary is
//! always published.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use xr_transport::aggregate::{GlobalAggregator, GlobalQoESummary};
use xr_transport::catalog::{CatalogSummary, FrameCatalog};
use xr_transport::directory::{PeerId, StaticDirectory};
use xr_transport::qoe::StreamQoESummary;
use xr_transport::receiver::{FrameRecord, Receiver, ReceiverEvent};
use xr_transport::sender::Sender;
use xr_transport::stats::{ReceiverStats, SenderStats};
use xr_transport::wire::Datagram;
use xr_transport::Error;

use crate::channel::{Channel, ChannelStats, DeliveryQueue};
use crate::config::{CatalogSource, SimConfig, UserConfig};
use crate::scenario::Timeline;

// Link conditions are generated this far past the last scheduled frame.
const TIMELINE_MARGIN_S: f64 = 5.0;

/// Result of one user's stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub index: usize,
    pub name: String,
    pub compression_level: u32,
    pub catalog: CatalogSummary,
    pub summary: StreamQoESummary,
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
    pub channel: ChannelStats,
    /// Why the sender stopped early, if it did.
    pub sender_error: Option<String>,
    /// Wall-clock time spent simulating this stream.
    pub elapsed_ms: f64,
    #[serde(skip)]
    pub records: Vec<FrameRecord>,
}

/// Result of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub seed: u64,
    pub streams: Vec<StreamReport>,
    pub global: Option<GlobalQoESummary>,
    pub elapsed_ms: f64,
}

struct Stream {
    index: usize,
    user: UserConfig,
    catalog: CatalogSummary,
    sender: Sender,
    receiver: Receiver,
    channel: Channel,
}

fn load_catalog(user: &UserConfig) -> Result<FrameCatalog> {
    let catalog = match &user.catalog {
        CatalogSource::File(path) => FrameCatalog::load(path, user.filter()),
        CatalogSource::Synthetic(synth) => synth.catalog(user.filter()).map_err(Error::from),
    };
    catalog.with_context(|| {
        format!(
            "user {}: no playable catalog at compression level {}",
            user.name, user.compression_level
        )
    })
}

/// Simulate every configured user and publish the global summary.
pub fn run(config: &SimConfig) -> Result<SimReport> {
    let started = quanta::Instant::now();
    let aggregator = Arc::new(GlobalAggregator::new());

    let mut directory = StaticDirectory::new();
    for (idx, user) in config.users.iter().enumerate() {
        directory.insert(user.address.clone(), PeerId(idx as u32));
    }

    // Build (and register) every stream before any of them runs.
    let mut streams = Vec::with_capacity(config.users.len());
    for (index, user) in config.users.iter().enumerate() {
        let catalog = load_catalog(user)?;
        let summary = catalog.summary();
        let sender_cfg = config.sender_for(index, user);
        let horizon_s = user.start_offset_s
            + catalog.len() as f64 * (1.0 / sender_cfg.fps + sender_cfg.jitter.max_ms.max(0.0) / 1000.0)
            + TIMELINE_MARGIN_S;
        let horizon = Duration::try_from_secs_f64(horizon_s).with_context(|| {
            format!("user {}: run horizon of {horizon_s} s is out of range", user.name)
        })?;
        let timeline = Timeline::generate(config.link.clone(), config.link_seed(index), horizon);
        let sender = Sender::new(sender_cfg, catalog)
            .with_context(|| format!("user {}: invalid sender config", user.name))?;
        let receiver = Receiver::new(config.receiver, Arc::clone(&aggregator))
            .with_context(|| format!("user {}: invalid receiver config", user.name))?;

        tracing::info!(
            user = %user.name,
            level = user.compression_level,
            frames = summary.frames,
            min_size = summary.min_size_bytes,
            max_size = summary.max_size_bytes,
            mean_error = summary.mean_error,
            start_offset_s = user.start_offset_s,
            "stream configured"
        );
        streams.push(Stream {
            index,
            user: user.clone(),
            catalog: summary,
            sender,
            receiver,
            channel: Channel::new(timeline, config.link_seed(index)),
        });
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::scope(|scope| {
        for stream in streams {
            let tx = tx.clone();
            let directory = &directory;
            scope.spawn(move || {
                let report = run_stream(stream, directory);
                // The receiving end outlives the scope.
                let _ = tx.send(report);
            });
        }
    });
    drop(tx);

    let mut reports: Vec<StreamReport> = rx.iter().collect();
    reports.sort_by_key(|r| r.index);

    let global = aggregator.published().cloned();
    if global.is_none() {
        tracing::warn!("global QoE summary was not published");
    }

    Ok(SimReport {
        seed: config.seed,
        streams: reports,
        global,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

fn deliver_until(queue: &mut DeliveryQueue, receiver: &mut Receiver, now: f64) {
    while let Some((arrival, bytes)) = queue.pop_due(now) {
        match Datagram::decode(bytes) {
            Some(datagram) => receiver.on_fragment(&datagram.to_fragment(), arrival),
            None => tracing::warn!(at = arrival, "undecodable datagram dropped"),
        }
    }
}

fn run_stream(stream: Stream, directory: &StaticDirectory) -> StreamReport {
    let started = quanta::Instant::now();
    let Stream {
        index,
        user,
        catalog,
        mut sender,
        mut receiver,
        mut channel,
    } = stream;
    let span = tracing::info_span!("stream", user = %user.name);
    let _enter = span.enter();

    let mut queue = DeliveryQueue::new();
    let mut sender_error = None;

    let mut next = match sender.start(0.0, directory) {
        Ok(first) => first,
        Err(e) => {
            tracing::error!(error = %e, "sender could not start");
            sender_error = Some(e.to_string());
            None
        }
    };

    while let Some(now) = next {
        deliver_until(&mut queue, &mut receiver, now);
        match sender.poll(now) {
            Ok(Some(burst)) => {
                for frag in &burst.fragments {
                    let bytes = Datagram::from_fragment(frag).encode().freeze();
                    if let Some(arrival) = channel.transmit(now, bytes.len()) {
                        queue.push(arrival, bytes);
                    }
                }
                next = burst.next_send_at;
            }
            Ok(None) => break,
            Err(e) => {
                sender_error = Some(e.to_string());
                break;
            }
        }
    }
    deliver_until(&mut queue, &mut receiver, f64::INFINITY);

    let outcome = receiver.finalize();
    tracing::info!(
        frames_sent = sender.stats().frames_sent,
        fragments_per_frame = sender.stats().fragments_per_frame(),
        duplicate_ratio = receiver.stats().duplicate_ratio(),
        link_loss = channel.stats().loss_ratio(),
        "stream drained"
    );
    let records = receiver
        .drain_events()
        .map(|event| match event {
            ReceiverEvent::FrameCompleted(r) | ReceiverEvent::FrameLost(r) => r,
        })
        .collect();

    StreamReport {
        index,
        name: user.name,
        compression_level: user.compression_level,
        catalog,
        summary: outcome.summary,
        sender: sender.stats().clone(),
        receiver: receiver.stats().clone(),
        channel: channel.stats().clone(),
        sender_error,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        records,
    }
}
