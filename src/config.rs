use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListenerConfig {
    /// Interface to bind (all interfaces by default)
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Receive buffer size; larger datagrams are truncated by the OS
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
    /// Log sample joint positions of every packet
    #[serde(default)]
    pub verbose: bool,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 9000 }
fn default_max_datagram_size() -> usize { 65_507 }

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_datagram_size: default_max_datagram_size(),
            verbose: false,
        }
    }
}

/// What to do with an upper-body packet whose payload timestamp is older than
/// the stored one. Lower-body snapshots are always stored.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StalenessPolicy {
    /// Arrival order wins, payload timestamps are ignored.
    #[default]
    LastWriteWins,
    /// Keep the stored value when the incoming one is strictly older.
    RejectOlder,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    /// Dump the full lower-body snapshot every N updates
    #[serde(default = "default_sample_every")]
    pub sample_every: u64,
    #[serde(default)]
    pub staleness: StalenessPolicy,
}

fn default_sample_every() -> u64 { 60 }

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            sample_every: default_sample_every(),
            staleness: StalenessPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProducerConfig {
    /// Pause between snapshots; 0 = as fast as the source delivers
    #[serde(default)]
    pub interval_ms: u64,
    /// Back-off after a source error
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Replace replayed timestamps with the current wall clock
    #[serde(default = "default_restamp")]
    pub restamp: bool,
}

fn default_retry_delay_ms() -> u64 { 100 }
fn default_restamp() -> bool { true }

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 0,
            retry_delay_ms: default_retry_delay_ms(),
            restamp: default_restamp(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset (e.g. "info", "pose_fusion=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// A missing file means defaults; a file that exists must parse.
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
