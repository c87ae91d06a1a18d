use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use std::time::Duration;

/// Longest walk generated; past it the last conditions hold.
pub const MAX_SCENARIO_STEPS: u64 = 100_000;

/// Bounds and step sizes for one link's random walk.
///
/// A `max_rate_kbit` of zero means the link has no rate limit.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkProfile {
    pub min_rate_kbit: u64,
    pub max_rate_kbit: u64,
    pub rate_step_kbit: u64,
    pub base_delay_ms: f64,
    /// The walked one-way delay stays within `base ± delay_range_ms`.
    pub delay_range_ms: f64,
    pub delay_step_ms: f64,
    /// Per-datagram extra delay, uniform in `[0, packet_jitter_ms)`.
    pub packet_jitter_ms: f64,
    pub max_loss_percent: f64,
    pub loss_step_percent: f64,
    /// Interval between walk steps.
    pub step: Duration,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            min_rate_kbit: 40_000,
            max_rate_kbit: 120_000,
            rate_step_kbit: 5_000,
            base_delay_ms: 8.0,
            delay_range_ms: 4.0,
            delay_step_ms: 1.0,
            packet_jitter_ms: 2.0,
            max_loss_percent: 1.0,
            loss_step_percent: 0.2,
            step: Duration::from_millis(100),
        }
    }
}

impl LinkProfile {
    /// No loss, no jitter, no rate limit, fixed delay.
    pub fn ideal(delay_ms: f64) -> Self {
        Self {
            min_rate_kbit: 0,
            max_rate_kbit: 0,
            rate_step_kbit: 0,
            base_delay_ms: delay_ms,
            delay_range_ms: 0.0,
            delay_step_ms: 0.0,
            packet_jitter_ms: 0.0,
            max_loss_percent: 0.0,
            loss_step_percent: 0.0,
            step: Duration::from_secs(1),
        }
    }

    fn is_rate_limited(&self) -> bool {
        self.max_rate_kbit > 0
    }
}

/// Link state in effect from one walk step to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConditions {
    pub delay_ms: f64,
    pub packet_jitter_ms: f64,
    pub loss_percent: f64,
    /// `None` when the link is not rate limited.
    pub rate_kbit: Option<f64>,
}

/// A single time-step of link conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioFrame {
    pub t: Duration,
    pub conditions: LinkConditions,
}

/// Deterministic random-walk scenario generator.
///
/// Given a seed, produces reproducible sequences of [`ScenarioFrame`]s
/// where the link's rate, delay, and loss evolve via random-walk steps
/// clamped to the profile's bounds.
#[derive(Debug)]
pub struct Scenario {
    profile: LinkProfile,
    rng: StdRng,
    rate_kbit: f64,
    delay_ms: f64,
    loss_percent: f64,
}

impl Scenario {
    pub fn new(profile: LinkProfile, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let rate_range = profile.max_rate_kbit.saturating_sub(profile.min_rate_kbit) as f64;
        let rate_kbit = profile.min_rate_kbit as f64 + rng.random::<f64>() * rate_range;
        let delay_ms = profile.base_delay_ms;
        let loss_percent = rng.random::<f64>() * profile.max_loss_percent * 0.2;
        Self {
            profile,
            rng,
            rate_kbit,
            delay_ms,
            loss_percent,
        }
    }

    fn conditions(&self) -> LinkConditions {
        LinkConditions {
            delay_ms: self.delay_ms,
            packet_jitter_ms: self.profile.packet_jitter_ms,
            loss_percent: self.loss_percent,
            rate_kbit: self
                .profile
                .is_rate_limited()
                .then(|| self.rate_kbit.max(1.0)),
        }
    }

    fn step(&mut self) {
        let p = &self.profile;
        let rate_delta = rand_signed(&mut self.rng, p.rate_step_kbit as f64);
        let delay_delta = rand_signed(&mut self.rng, p.delay_step_ms);
        let loss_delta = rand_signed(&mut self.rng, p.loss_step_percent);

        self.rate_kbit =
            (self.rate_kbit + rate_delta).clamp(p.min_rate_kbit as f64, p.max_rate_kbit as f64);
        self.delay_ms = (self.delay_ms + delay_delta).clamp(
            (p.base_delay_ms - p.delay_range_ms).max(0.0),
            p.base_delay_ms + p.delay_range_ms,
        );
        self.loss_percent = (self.loss_percent + loss_delta).clamp(0.0, p.max_loss_percent);
    }

    /// Walk for `duration`, one frame per step, the first at `t = 0`. At
    /// most [`MAX_SCENARIO_STEPS`] steps are taken.
    pub fn frames(&mut self, duration: Duration) -> Vec<ScenarioFrame> {
        let step = self.profile.step.max(Duration::from_millis(1));
        let total_steps = duration
            .as_nanos()
            .div_ceil(step.as_nanos())
            .min(u128::from(MAX_SCENARIO_STEPS)) as u32;

        let mut frames = Vec::with_capacity(total_steps as usize + 1);
        for step_idx in 0..=total_steps {
            if step_idx > 0 {
                self.step();
            }
            frames.push(ScenarioFrame {
                t: step.saturating_mul(step_idx),
                conditions: self.conditions(),
            });
        }
        frames
    }
}

fn rand_signed(rng: &mut StdRng, max_step: f64) -> f64 {
    if max_step <= 0.0 {
        return 0.0;
    }
    let mag = rng.random::<f64>() * max_step;
    if rng.random::<bool>() {
        mag
    } else {
        -mag
    }
}

/// Time-indexed lookup over scenario frames.
#[derive(Debug, Clone)]
pub struct Timeline {
    frames: Vec<ScenarioFrame>,
}

impl Timeline {
    pub fn new(frames: Vec<ScenarioFrame>) -> Self {
        Self { frames }
    }

    pub fn generate(profile: LinkProfile, seed: u64, duration: Duration) -> Self {
        Self::new(Scenario::new(profile, seed).frames(duration))
    }

    /// Conditions in effect at `t` seconds. Past the last frame the last
    /// conditions hold; an empty timeline is a perfect link.
    pub fn at(&self, t: f64) -> LinkConditions {
        let idx = self
            .frames
            .partition_point(|f| f.t.as_secs_f64() <= t)
            .saturating_sub(1);
        self.frames
            .get(idx)
            .map(|f| f.conditions)
            .unwrap_or(LinkConditions {
                delay_ms: 0.0,
                packet_jitter_ms: 0.0,
                loss_percent: 0.0,
                rate_kbit: None,
            })
    }

    pub fn frames(&self) -> &[ScenarioFrame] {
        &self.frames
    }
}
