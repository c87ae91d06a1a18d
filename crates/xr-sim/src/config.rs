//! Simulator configuration: TOML input with every field optional, resolved
//! against defaults into a validated [`SimConfig`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use serde::Deserialize;
use xr_transport::catalog::ComponentFilter;
use xr_transport::jitter::JitterConfig;
use xr_transport::receiver::ReceiverConfig;
use xr_transport::sender::SenderConfig;

use crate::output::frame_log_name;
use crate::scenario::LinkProfile;
use crate::synth::{SyntheticCatalog, COMPRESSION_LEVELS};

pub const CONFIG_VERSION: u32 = 1;

// ─── Input (as written in TOML) ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimConfigInput {
    pub version: u32,
    pub seed: Option<u64>,
    /// Number of users; explicit `[[users]]` entries are kept first.
    pub user_count: Option<usize>,
    pub sender: SenderInput,
    pub receiver: ReceiverInput,
    pub catalog: CatalogInput,
    pub link: LinkInput,
    pub users: Vec<UserInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SenderInput {
    pub fps: Option<f64>,
    pub start_time_s: Option<f64>,
    pub max_payload_size: Option<usize>,
    pub jitter: JitterInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JitterInput {
    pub mean_ms: Option<f64>,
    pub stddev_ms: Option<f64>,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReceiverInput {
    pub deadline_ms: Option<f64>,
    pub reliability_threshold: Option<f64>,
    pub expected_frames: Option<u32>,
    pub max_penalty: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogInput {
    /// CSV sweep file; when absent a synthetic sweep is generated.
    pub path: Option<PathBuf>,
    pub synthetic_frames: Option<u32>,
    pub levels: Option<Vec<u32>>,
    pub bytes_per_component: Option<u32>,
    pub base_mse: Option<f64>,
    pub spread: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkInput {
    /// `true` replaces every other link field with a lossless fixed-delay link.
    pub ideal: bool,
    pub min_rate_kbit: Option<u64>,
    pub max_rate_kbit: Option<u64>,
    pub rate_step_kbit: Option<u64>,
    pub base_delay_ms: Option<f64>,
    pub delay_range_ms: Option<f64>,
    pub delay_step_ms: Option<f64>,
    pub packet_jitter_ms: Option<f64>,
    pub max_loss_percent: Option<f64>,
    pub loss_step_percent: Option<f64>,
    pub step_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserInput {
    pub name: Option<String>,
    /// PCA component count to play; 0 plays every catalog row.
    pub compression_level: Option<u32>,
    pub start_time_s: Option<f64>,
    /// Address the sender resolves; defaults to the user's own address.
    pub destination: Option<String>,
    /// Per-user catalog file, overriding `[catalog]`.
    pub catalog: Option<PathBuf>,
}

// ─── Resolved ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogSource {
    File(PathBuf),
    Synthetic(SyntheticCatalog),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserConfig {
    pub name: String,
    /// Address the user's receiver is reachable at.
    pub address: String,
    pub destination: String,
    pub compression_level: u32,
    pub start_offset_s: f64,
    pub catalog: CatalogSource,
}

impl UserConfig {
    pub fn filter(&self) -> ComponentFilter {
        ComponentFilter::from_level(self.compression_level)
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub version: u32,
    pub seed: u64,
    /// Template for every user's sender; destination, start offset and jitter
    /// seed are filled in per user.
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
    pub link: LinkProfile,
    pub users: Vec<UserConfig>,
}

impl SimConfigInput {
    pub fn resolve(self) -> Result<SimConfig> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            bail!("unsupported config version {version}");
        }
        let seed = self.seed.unwrap_or(1);

        let sender_defaults = SenderConfig::default();
        let jitter_defaults = JitterConfig::default();
        let sender = SenderConfig {
            fps: self.sender.fps.unwrap_or(sender_defaults.fps),
            start_offset_s: self
                .sender
                .start_time_s
                .unwrap_or(sender_defaults.start_offset_s),
            jitter: JitterConfig {
                mean_ms: self.sender.jitter.mean_ms.unwrap_or(jitter_defaults.mean_ms),
                stddev_ms: self
                    .sender
                    .jitter
                    .stddev_ms
                    .unwrap_or(jitter_defaults.stddev_ms),
                min_ms: self.sender.jitter.min_ms.unwrap_or(jitter_defaults.min_ms),
                max_ms: self.sender.jitter.max_ms.unwrap_or(jitter_defaults.max_ms),
                seed,
            },
            max_payload_size: self
                .sender
                .max_payload_size
                .unwrap_or(sender_defaults.max_payload_size),
            destination: String::new(),
        };
        sender.validate().context("invalid [sender] section")?;

        let receiver_defaults = ReceiverConfig::default();
        let receiver = ReceiverConfig {
            deadline_ms: self
                .receiver
                .deadline_ms
                .unwrap_or(receiver_defaults.deadline_ms),
            reliability_threshold: self
                .receiver
                .reliability_threshold
                .unwrap_or(receiver_defaults.reliability_threshold),
            expected_total_frames: self
                .receiver
                .expected_frames
                .unwrap_or(receiver_defaults.expected_total_frames),
            max_penalty: self
                .receiver
                .max_penalty
                .unwrap_or(receiver_defaults.max_penalty),
        };
        receiver.validate().context("invalid [receiver] section")?;

        let link = self.link.resolve()?;

        let shared_catalog = match self.catalog.path {
            Some(path) => CatalogSource::File(path),
            None => {
                let d = SyntheticCatalog::default();
                CatalogSource::Synthetic(SyntheticCatalog {
                    frames: self.catalog.synthetic_frames.unwrap_or(d.frames),
                    levels: self.catalog.levels.unwrap_or(d.levels),
                    bytes_per_component: self
                        .catalog
                        .bytes_per_component
                        .unwrap_or(d.bytes_per_component),
                    base_mse: self.catalog.base_mse.unwrap_or(d.base_mse),
                    spread: self.catalog.spread.unwrap_or(d.spread),
                    seed: seed ^ d.seed,
                })
            }
        };
        let levels = match &shared_catalog {
            CatalogSource::Synthetic(s) if !s.levels.is_empty() => s.levels.clone(),
            _ => COMPRESSION_LEVELS.to_vec(),
        };

        let user_count = self.user_count.unwrap_or(self.users.len().max(1));
        let mut level_rng = StdRng::seed_from_u64(seed);
        let mut inputs = self.users;
        inputs.truncate(user_count);
        inputs.resize_with(user_count, UserInput::default);

        let mut users = Vec::with_capacity(user_count);
        // Frame log file name -> user that claimed it.
        let mut log_names: HashMap<String, String> = HashMap::with_capacity(user_count);
        for (idx, user) in inputs.into_iter().enumerate() {
            let address = format!("ue{idx}");
            let name = user
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| address.clone());
            if let Some(other) = log_names.insert(frame_log_name(&name), name.clone()) {
                bail!("user names {other:?} and {name:?} collide; names must be unique");
            }
            let compression_level = match user.compression_level {
                Some(level) => level,
                None => levels[level_rng.random_range(0..levels.len())],
            };
            let start_offset_s = user.start_time_s.unwrap_or(sender.start_offset_s);
            if !start_offset_s.is_finite() || start_offset_s < 0.0 {
                bail!("user {name}: start_time_s must be non-negative (got {start_offset_s})");
            }
            users.push(UserConfig {
                destination: user.destination.unwrap_or_else(|| address.clone()),
                address,
                name,
                compression_level,
                start_offset_s,
                catalog: user
                    .catalog
                    .map(CatalogSource::File)
                    .unwrap_or_else(|| shared_catalog.clone()),
            });
        }
        if users.is_empty() {
            bail!("at least one user is required");
        }

        Ok(SimConfig {
            version,
            seed,
            sender,
            receiver,
            link,
            users,
        })
    }
}

impl LinkInput {
    fn resolve(self) -> Result<LinkProfile> {
        let d = LinkProfile::default();
        if self.ideal {
            return Ok(LinkProfile::ideal(
                self.base_delay_ms.unwrap_or(d.base_delay_ms),
            ));
        }
        let profile = LinkProfile {
            min_rate_kbit: self.min_rate_kbit.unwrap_or(d.min_rate_kbit),
            max_rate_kbit: self.max_rate_kbit.unwrap_or(d.max_rate_kbit),
            rate_step_kbit: self.rate_step_kbit.unwrap_or(d.rate_step_kbit),
            base_delay_ms: self.base_delay_ms.unwrap_or(d.base_delay_ms),
            delay_range_ms: self.delay_range_ms.unwrap_or(d.delay_range_ms),
            delay_step_ms: self.delay_step_ms.unwrap_or(d.delay_step_ms),
            packet_jitter_ms: self.packet_jitter_ms.unwrap_or(d.packet_jitter_ms),
            max_loss_percent: self.max_loss_percent.unwrap_or(d.max_loss_percent),
            loss_step_percent: self.loss_step_percent.unwrap_or(d.loss_step_percent),
            step: self.step_ms.map(Duration::from_millis).unwrap_or(d.step),
        };
        if profile.max_rate_kbit > 0 && profile.min_rate_kbit > profile.max_rate_kbit {
            bail!(
                "[link] min_rate_kbit {} exceeds max_rate_kbit {}",
                profile.min_rate_kbit,
                profile.max_rate_kbit
            );
        }
        if !(0.0..=100.0).contains(&profile.max_loss_percent) {
            bail!(
                "[link] max_loss_percent must lie in [0, 100] (got {})",
                profile.max_loss_percent
            );
        }
        if profile.base_delay_ms < 0.0 || profile.packet_jitter_ms < 0.0 {
            bail!("[link] delays must be non-negative");
        }
        Ok(profile)
    }
}

impl SimConfigInput {
    /// Parse without resolving, so callers can override fields first. Empty
    /// input is the all-defaults config.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        toml::from_str(input).context("invalid config TOML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in config {}", path.display()))
    }
}

impl SimConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        SimConfigInput::from_toml_str(input)?.resolve()
    }

    pub fn load(path: &Path) -> Result<Self> {
        SimConfigInput::load(path)?
            .resolve()
            .with_context(|| format!("in config {}", path.display()))
    }

    /// The sender configuration for one user.
    pub fn sender_for(&self, index: usize, user: &UserConfig) -> SenderConfig {
        let mut cfg = self.sender.clone();
        cfg.destination = user.destination.clone();
        cfg.start_offset_s = user.start_offset_s;
        cfg.jitter.seed = stream_seed(self.seed, index, 0);
        cfg
    }

    /// Seed for the link of one user.
    pub fn link_seed(&self, index: usize) -> u64 {
        stream_seed(self.seed, index, 1)
    }
}

/// Per-stream seeds decorrelated from the run seed.
fn stream_seed(seed: u64, index: usize, salt: u64) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((index as u64) << 8)
        .wrapping_add(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = SimConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.version, CONFIG_VERSION);
        assert_eq!(cfg.users.len(), 1);
        assert_eq!(cfg.sender.fps, 60.0);
        assert_eq!(cfg.sender.max_payload_size, 1400);
        assert_eq!(cfg.sender.jitter.stddev_ms, 2.0);
        assert_eq!(cfg.receiver.deadline_ms, 40.0);
        assert_eq!(cfg.receiver.reliability_threshold, 0.99);
        assert_eq!(cfg.receiver.expected_total_frames, 100);
        assert_eq!(cfg.receiver.max_penalty, 1000.0);
        assert!(matches!(cfg.users[0].catalog, CatalogSource::Synthetic(_)));
    }

    #[test]
    fn parse_toml_config_basic() {
        let toml = r#"
            version = 1
            seed = 9
            user_count = 3

            [sender]
            fps = 30
            start_time_s = 0.5
            [sender.jitter]
            stddev_ms = 1.0

            [receiver]
            deadline_ms = 5
            expected_frames = 20

            [link]
            base_delay_ms = 2.0
            max_loss_percent = 3.0
            step_ms = 50

            [[users]]
            name = "headset"
            compression_level = 40

            [[users]]
            compression_level = 0
            start_time_s = 1.0
            destination = "nowhere"
        "#;

        let cfg = SimConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.seed, 9);
        assert_eq!(cfg.sender.fps, 30.0);
        assert_eq!(cfg.sender.jitter.stddev_ms, 1.0);
        assert_eq!(cfg.sender.jitter.max_ms, 5.0);
        assert_eq!(cfg.receiver.deadline_ms, 5.0);
        assert_eq!(cfg.receiver.expected_total_frames, 20);
        assert_eq!(cfg.link.base_delay_ms, 2.0);
        assert_eq!(cfg.link.max_loss_percent, 3.0);
        assert_eq!(cfg.link.step, Duration::from_millis(50));

        assert_eq!(cfg.users.len(), 3);
        assert_eq!(cfg.users[0].name, "headset");
        assert_eq!(cfg.users[0].compression_level, 40);
        assert_eq!(cfg.users[0].start_offset_s, 0.5);
        assert_eq!(cfg.users[1].name, "ue1");
        assert_eq!(cfg.users[1].filter(), ComponentFilter::All);
        assert_eq!(cfg.users[1].start_offset_s, 1.0);
        assert_eq!(cfg.users[1].destination, "nowhere");
        assert_eq!(cfg.users[2].address, "ue2");
        assert!(COMPRESSION_LEVELS.contains(&cfg.users[2].compression_level));
    }

    #[test]
    fn user_count_truncates_explicit_users() {
        let toml = r#"
            user_count = 1
            [[users]]
            name = "a"
            [[users]]
            name = "b"
        "#;
        let cfg = SimConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.users.len(), 1);
        assert_eq!(cfg.users[0].name, "a");
    }

    #[test]
    fn generated_levels_are_deterministic() {
        let toml = "seed = 5\nuser_count = 8";
        let a = SimConfig::from_toml_str(toml).unwrap();
        let b = SimConfig::from_toml_str(toml).unwrap();
        let la: Vec<_> = a.users.iter().map(|u| u.compression_level).collect();
        let lb: Vec<_> = b.users.iter().map(|u| u.compression_level).collect();
        assert_eq!(la, lb);
    }

    #[test]
    fn ideal_link_ignores_impairments() {
        let toml = r#"
            [link]
            ideal = true
            base_delay_ms = 3.0
            max_loss_percent = 50.0
        "#;
        let cfg = SimConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.link, LinkProfile::ideal(3.0));
    }

    #[test]
    fn per_stream_seeds_differ() {
        let cfg = SimConfig::from_toml_str("user_count = 2").unwrap();
        let a = cfg.sender_for(0, &cfg.users[0]);
        let b = cfg.sender_for(1, &cfg.users[1]);
        assert_ne!(a.jitter.seed, b.jitter.seed);
        assert_ne!(cfg.link_seed(0), cfg.link_seed(1));
        assert_ne!(cfg.link_seed(0), a.jitter.seed);
        assert_eq!(a.destination, "ue0");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(SimConfig::from_toml_str("version = 2").is_err());
        assert!(SimConfig::from_toml_str("[receiver]\nreliability_threshold = 1.5").is_err());
        assert!(SimConfig::from_toml_str("[sender]\nfps = 0").is_err());
        assert!(SimConfig::from_toml_str("[sender.jitter]\nmin_ms = 5\nmax_ms = -5").is_err());
        assert!(SimConfig::from_toml_str("[link]\nmax_loss_percent = 120").is_err());
        assert!(SimConfig::from_toml_str("user_count = 0").is_err());
        assert!(SimConfig::from_toml_str("[sender]\nfps = \"fast\"").is_err());
        assert!(SimConfig::from_toml_str("[sender.jitter]\nmean_ms = nan").is_err());
        assert!(SimConfig::from_toml_str("[receiver]\nmax_penalty = -1.0").is_err());
    }

    #[test]
    fn colliding_user_names_rejected() {
        for names in [["dup", "dup"], ["a b", "a_b"], ["ue1", ""]] {
            let toml = format!(
                "[[users]]\nname = {:?}\n[[users]]\nname = {:?}\n",
                names[0], names[1]
            );
            let err = SimConfig::from_toml_str(&toml).unwrap_err();
            assert!(format!("{err:#}").contains("collide"), "{names:?}");
        }
        assert!(SimConfig::from_toml_str("[[users]]\nname = \"a\"\n[[users]]\nname = \"b\"").is_ok());
    }
}
