//! Synthetic frame catalogs for runs without a recorded PCA sweep.
//!
//! Generates one row per (frame, compression level), the same shape as a
//! sweep file: more components means a larger frame and a lower
//! reconstruction error. Per-row noise keeps frames from being identical.
//! Output is fully determined by the seed.

use std::fmt::Write as _;

use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use xr_transport::catalog::{ComponentFilter, FrameCatalog, FrameDescriptor};
use xr_transport::ConfigError;

/// Compression levels (PCA component counts) a user can be assigned.
pub const COMPRESSION_LEVELS: [u32; 16] = [
    5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60, 65, 70, 75, 80,
];

/// Parameters of a generated sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticCatalog {
    pub frames: u32,
    pub levels: Vec<u32>,
    /// Mean encoded bytes per kept component.
    pub bytes_per_component: u32,
    /// Error at zero components; decays as components are added.
    pub base_mse: f64,
    /// Relative noise applied to size and error, in `[0, 1)`.
    pub spread: f64,
    pub seed: u64,
}

impl Default for SyntheticCatalog {
    fn default() -> Self {
        Self {
            frames: 100,
            levels: COMPRESSION_LEVELS.to_vec(),
            bytes_per_component: 400,
            base_mse: 60.0,
            spread: 0.15,
            seed: 7,
        }
    }
}

impl SyntheticCatalog {
    /// Every row of the sweep, frame-major.
    pub fn rows(&self) -> Vec<FrameDescriptor> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let spread = self.spread.clamp(0.0, 0.99);
        let mut noise = move || 1.0 + spread * (rng.random::<f64>() * 2.0 - 1.0);

        let mut rows = Vec::with_capacity(self.frames as usize * self.levels.len());
        for frame in 1..=self.frames {
            for &level in &self.levels {
                let size = (level as f64 * self.bytes_per_component as f64 * noise()).round();
                let mse = self.base_mse * (-(level as f64) / 25.0).exp() * noise();
                rows.push(FrameDescriptor {
                    sequence_number: frame,
                    component_count: level,
                    reconstruction_error: mse,
                    size_bytes: size.max(1.0) as u32,
                });
            }
        }
        rows
    }

    /// The sweep as catalog CSV text.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("frame,components,mse,size_bytes\n");
        for row in self.rows() {
            let _ = writeln!(
                out,
                "{},{},{},{}",
                row.sequence_number, row.component_count, row.reconstruction_error, row.size_bytes
            );
        }
        out
    }

    /// The rows `filter` selects, as a playable catalog.
    pub fn catalog(&self, filter: ComponentFilter) -> Result<FrameCatalog, ConfigError> {
        FrameCatalog::from_frames(self.rows(), filter)
    }
}
