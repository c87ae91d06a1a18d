//! Result files.
//!
//! One frame log per user (`user_<name>_frames.csv`), a per-stream QoE
//! table (`streams.csv`), the global summary (`global_qoe.csv`) and the
//! whole report as JSON (`report.json`).

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use xr_transport::aggregate::GlobalQoESummary;
use xr_transport::receiver::FrameRecord;

use crate::runner::{SimReport, StreamReport};

pub const FRAME_LOG_HEADER: &str =
    "frameNumber,components,mse,sizeBytes,genTime,recvTime,delay_ms,receivedOnTime,effectiveError,deadline_ms";

pub const GLOBAL_HEADER: &str = "num_users,satisfied_users,global_avg_mean_error,global_delay_reliability,total_frames,total_ontime_frames";

pub const STREAMS_HEADER: &str = "user,compression_level,total_frames,received_frames,on_time_frames,late_frames,lost_frames,mean_error,avg_delay_ms,delay_reliability,user_satisfied,sender_error";

/// One frame-log row. Frames that never completed use the compact lost form.
pub fn frame_row(r: &FrameRecord) -> String {
    if r.delay_ms < 0.0 {
        return format!(
            "{},0,0,0,0,0,-1,0,{},{}",
            r.frame_number, r.effective_error, r.deadline_ms
        );
    }
    format!(
        "{},{},{},{},{:.9},{:.9},{:.6},{},{:.6},{}",
        r.frame_number,
        r.component_count,
        r.reconstruction_error,
        r.size_bytes,
        r.generation_timestamp,
        r.reception_timestamp,
        r.delay_ms,
        u8::from(r.received_on_time),
        r.effective_error,
        r.deadline_ms,
    )
}

pub fn frame_log(records: &[FrameRecord]) -> String {
    let mut out = String::with_capacity(64 * (records.len() + 1));
    out.push_str(FRAME_LOG_HEADER);
    out.push('\n');
    for r in records {
        out.push_str(&frame_row(r));
        out.push('\n');
    }
    out
}

pub fn global_csv(g: &GlobalQoESummary) -> String {
    format!(
        "{GLOBAL_HEADER}\n{},{},{:.6},{:.6},{},{}\n",
        g.stream_count,
        g.satisfied_stream_count,
        g.global_mean_error,
        g.global_delay_reliability,
        g.total_expected_frames,
        g.total_on_time_frames,
    )
}

/// Free text as a single CSV field: commas become `;`.
fn csv_field(text: &str) -> String {
    text.replace(',', ";")
}

pub fn streams_csv(streams: &[StreamReport]) -> String {
    let mut out = String::from(STREAMS_HEADER);
    out.push('\n');
    for s in streams {
        let q = &s.summary;
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{:.6},{:.6},{:.6},{},{}",
            csv_field(&s.name),
            s.compression_level,
            q.total_frames,
            q.received_frames,
            q.on_time_frames,
            q.late_frames,
            q.lost_frames,
            q.mean_error,
            q.avg_delay_ms,
            q.delay_reliability,
            u8::from(q.user_satisfied),
            csv_field(s.sender_error.as_deref().unwrap_or("")),
        );
    }
    out
}

/// File name of a user's frame log. Characters outside `[A-Za-z0-9_-]`
/// become `_`.
pub fn frame_log_name(user: &str) -> String {
    let safe: String = user
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("user_{safe}_frames.csv")
}

fn write(path: PathBuf, contents: &str) -> Result<PathBuf> {
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Write every result file into `dir`, creating it if needed. Returns the
/// paths written.
pub fn write_all(dir: &Path, report: &SimReport) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut written = Vec::with_capacity(report.streams.len() + 3);
    for stream in &report.streams {
        written.push(write(
            dir.join(frame_log_name(&stream.name)),
            &frame_log(&stream.records),
        )?);
    }
    written.push(write(dir.join("streams.csv"), &streams_csv(&report.streams))?);
    if let Some(global) = &report.global {
        written.push(write(dir.join("global_qoe.csv"), &global_csv(global))?);
    }
    let json = serde_json::to_string_pretty(report).context("serializing report")?;
    written.push(write(dir.join("report.json"), &json)?);

    tracing::info!(dir = %dir.display(), files = written.len(), "results written");
    Ok(written)
}
