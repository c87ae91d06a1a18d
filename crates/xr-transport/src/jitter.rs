//! # Jitter Sampler
//!
//! Truncated-normal delay samples used to perturb the frame interval.
//!
//! Out-of-range draws are redrawn up to [`MAX_REDRAWS`] times; if the value is
//! still outside `[min, max]` it is clamped to the nearest bound, so sampling
//! always terminates with a bounded value.

use rand::rngs::StdRng;
use rand::Rng;
use rand::RngExt as _;
use rand::SeedableRng;
use serde::Deserialize;

use crate::error::ConfigError;

/// Redraw budget before falling back to clamping.
pub const MAX_REDRAWS: u32 = 1000;

/// Jitter distribution parameters, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub seed: u64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        JitterConfig {
            mean_ms: 0.0,
            stddev_ms: 2.0,
            min_ms: -5.0,
            max_ms: 5.0,
            seed: 1,
        }
    }
}

impl JitterConfig {
    /// No jitter at all: every sample is exactly zero.
    pub fn none() -> Self {
        JitterConfig {
            mean_ms: 0.0,
            stddev_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
            seed: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_ms.is_finite() || !self.max_ms.is_finite() || self.min_ms > self.max_ms {
            return Err(ConfigError::InvalidJitterBounds {
                min: self.min_ms,
                max: self.max_ms,
            });
        }
        if !self.stddev_ms.is_finite() || self.stddev_ms < 0.0 {
            return Err(ConfigError::InvalidJitterStdDev(self.stddev_ms));
        }
        if !self.mean_ms.is_finite() {
            return Err(ConfigError::InvalidJitterMean(self.mean_ms));
        }
        Ok(())
    }
}

/// Seeded truncated-normal sampler.
#[derive(Debug)]
pub struct JitterSampler {
    config: JitterConfig,
    rng: StdRng,
}

impl JitterSampler {
    pub fn new(config: JitterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(JitterSampler {
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }

    pub fn config(&self) -> &JitterConfig {
        &self.config
    }

    /// Draw one jitter value in milliseconds, within `[min_ms, max_ms]`.
    pub fn sample(&mut self) -> f64 {
        let JitterConfig {
            mean_ms,
            stddev_ms,
            min_ms,
            max_ms,
            ..
        } = self.config;

        let mut x = mean_ms + stddev_ms * standard_normal(&mut self.rng);
        let mut redraws = 0;
        while (x < min_ms || x > max_ms) && redraws < MAX_REDRAWS {
            x = mean_ms + stddev_ms * standard_normal(&mut self.rng);
            redraws += 1;
        }
        x.clamp(min_ms, max_ms)
    }
}

/// Box-Muller standard normal.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    // 1 - U keeps u1 in (0, 1] so ln() stays finite.
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0_f64 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
