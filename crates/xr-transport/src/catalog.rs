//! # Frame Catalog
//!
//! Ordered, read-only list of pre-computed frame descriptors. Each row of the
//! catalog describes one compressed frame: its sequence number, how many PCA
//! components were kept, the resulting reconstruction error, and the
//! compressed size on the wire.
//!
//! The CSV form is `frame,components,mse,size_bytes` with a header line.
//! Malformed rows are skipped with a warning; they never abort the load.

use std::path::Path;

use serde::Serialize;

use crate::error::{ConfigError, Error};

/// One pre-computed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameDescriptor {
    /// Frame number, starting at 1.
    pub sequence_number: u32,
    /// Number of PCA components used to encode the frame.
    pub component_count: u32,
    /// Reconstruction error (MSE) of the encoded frame.
    pub reconstruction_error: f64,
    /// Compressed size in bytes.
    pub size_bytes: u32,
}

/// Selects which catalog rows a stream plays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentFilter {
    /// Keep every row.
    #[default]
    All,
    /// Keep only rows encoded with exactly this many components.
    Components(u32),
}

impl ComponentFilter {
    /// Map a compression level to a filter; level 0 means "all rows".
    pub fn from_level(level: u32) -> Self {
        if level == 0 {
            ComponentFilter::All
        } else {
            ComponentFilter::Components(level)
        }
    }

    pub fn accepts(&self, frame: &FrameDescriptor) -> bool {
        match self {
            ComponentFilter::All => true,
            ComponentFilter::Components(n) => frame.component_count == *n,
        }
    }
}

/// Load-time summary of a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CatalogSummary {
    pub frames: usize,
    pub min_size_bytes: u32,
    pub max_size_bytes: u32,
    pub mean_error: f64,
}

/// Ordered frame catalog.
#[derive(Debug, Clone)]
pub struct FrameCatalog {
    frames: Vec<FrameDescriptor>,
}

impl FrameCatalog {
    /// Build a catalog from already-parsed descriptors, applying `filter`.
    ///
    /// Fails with [`ConfigError::EmptyCatalog`] if nothing survives the filter.
    pub fn from_frames(
        frames: impl IntoIterator<Item = FrameDescriptor>,
        filter: ComponentFilter,
    ) -> Result<Self, ConfigError> {
        let frames: Vec<_> = frames.into_iter().filter(|f| filter.accepts(f)).collect();
        if frames.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        Ok(FrameCatalog { frames })
    }

    /// Read and parse a CSV catalog from disk.
    pub fn load(path: impl AsRef<Path>, filter: ComponentFilter) -> crate::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::parse_csv(&text, filter)?;
        let summary = catalog.summary();
        tracing::info!(
            path = %path.display(),
            frames = summary.frames,
            min_size = summary.min_size_bytes,
            max_size = summary.max_size_bytes,
            mean_error = summary.mean_error,
            "frame catalog loaded"
        );
        Ok(catalog)
    }

    /// Parse CSV text. The first line is a header and is ignored.
    pub fn parse_csv(text: &str, filter: ComponentFilter) -> Result<Self, ConfigError> {
        let mut lines = text.lines();
        if lines.next().is_none() {
            return Err(ConfigError::EmptyCatalog);
        }

        let mut frames = Vec::new();
        // Line numbers are 1-based and count the header.
        for (idx, line) in lines.enumerate() {
            let line_no = idx + 2;
            if line.trim().is_empty() {
                continue;
            }
            match parse_row(line) {
                Ok(frame) => frames.push(frame),
                Err(reason) => {
                    tracing::warn!(line = line_no, %reason, "skipping malformed catalog row");
                }
            }
        }

        Self::from_frames(frames, filter)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FrameDescriptor> {
        self.frames.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameDescriptor> + '_ {
        self.frames.iter()
    }

    pub fn frames(&self) -> &[FrameDescriptor] {
        &self.frames
    }

    /// Size range and mean reconstruction error.
    pub fn summary(&self) -> CatalogSummary {
        let mut min_size = u32::MAX;
        let mut max_size = 0;
        let mut sum_error = 0.0;
        for f in &self.frames {
            min_size = min_size.min(f.size_bytes);
            max_size = max_size.max(f.size_bytes);
            sum_error += f.reconstruction_error;
        }
        CatalogSummary {
            frames: self.frames.len(),
            min_size_bytes: if self.frames.is_empty() { 0 } else { min_size },
            max_size_bytes: max_size,
            mean_error: if self.frames.is_empty() {
                0.0
            } else {
                sum_error / self.frames.len() as f64
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RowError {
    #[error("expected 4 fields, got {0}")]
    FieldCount(usize),
    #[error("field `{field}` has invalid value {value:?}")]
    Value { field: &'static str, value: String },
}

fn parse_row(line: &str) -> Result<FrameDescriptor, RowError> {
    let fields: Vec<String> = line
        .split(',')
        .map(|f| f.chars().filter(|c| !c.is_whitespace()).collect())
        .collect();
    if fields.len() != 4 {
        return Err(RowError::FieldCount(fields.len()));
    }

    let sequence_number = parse_field::<u32>("frame", &fields[0])?;
    if sequence_number == 0 {
        return Err(RowError::Value {
            field: "frame",
            value: fields[0].clone(),
        });
    }
    let component_count = parse_field::<u32>("components", &fields[1])?;
    let reconstruction_error = parse_field::<f64>("mse", &fields[2])?;
    if !reconstruction_error.is_finite() || reconstruction_error < 0.0 {
        return Err(RowError::Value {
            field: "mse",
            value: fields[2].clone(),
        });
    }
    let size_bytes = parse_field::<u32>("size_bytes", &fields[3])?;

    Ok(FrameDescriptor {
        sequence_number,
        component_count,
        reconstruction_error,
        size_bytes,
    })
}

fn parse_field<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, RowError> {
    raw.parse().map_err(|_| RowError::Value {
        field,
        value: raw.to_string(),
    })
}
