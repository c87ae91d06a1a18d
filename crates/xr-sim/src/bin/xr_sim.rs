//! XR delivery simulator
//!
//! Runs every configured user through the sender → link → receiver pipeline
//! and writes per-frame logs plus the stream and global QoE summaries.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use xr_sim::config::{CatalogSource, SimConfigInput};
use xr_sim::{output, runner};

/// Multi-user XR frame delivery simulator.
#[derive(Parser, Debug)]
#[command(name = "xr-sim", about = "Simulate XR frame delivery and score per-user QoE")]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for result files.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Override the run seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the number of users.
    #[arg(long)]
    streams: Option<usize>,

    /// Also write the first user's synthetic catalog as CSV to this path.
    #[arg(long)]
    dump_catalog: Option<PathBuf>,

    /// Print the report as JSON on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let mut input = match &cli.config {
        Some(path) => SimConfigInput::load(path)?,
        None => SimConfigInput::default(),
    };
    if cli.seed.is_some() {
        input.seed = cli.seed;
    }
    if cli.streams.is_some() {
        input.user_count = cli.streams;
    }
    let config = input.resolve().context("invalid configuration")?;

    tracing::info!(
        seed = config.seed,
        users = config.users.len(),
        fps = config.sender.fps,
        deadline_ms = config.receiver.deadline_ms,
        expected_frames = config.receiver.expected_total_frames,
        "xr-sim starting"
    );

    if let Some(path) = &cli.dump_catalog {
        match config.users.first().map(|u| &u.catalog) {
            Some(CatalogSource::Synthetic(synth)) => {
                std::fs::write(path, synth.to_csv())
                    .with_context(|| format!("writing catalog {}", path.display()))?;
                tracing::info!(path = %path.display(), "synthetic catalog written");
            }
            _ => tracing::warn!("--dump-catalog ignored: first user reads a catalog file"),
        }
    }

    let report = runner::run(&config)?;
    output::write_all(&cli.output_dir, &report)?;

    for stream in &report.streams {
        tracing::info!(
            user = %stream.name,
            level = stream.compression_level,
            on_time = stream.summary.on_time_frames,
            lost = stream.summary.lost_frames,
            mean_error = stream.summary.mean_error,
            reliability = stream.summary.delay_reliability,
            satisfied = stream.summary.user_satisfied,
            "stream finished"
        );
    }
    if let Some(global) = &report.global {
        tracing::info!(
            users = global.stream_count,
            satisfied = global.satisfied_stream_count,
            mean_error = global.global_mean_error,
            reliability = global.global_delay_reliability,
            elapsed_ms = report.elapsed_ms,
            "run complete"
        );
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serializing report")?
        );
    }
    Ok(())
}
