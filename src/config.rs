// src/config.rs

//! Process configuration: `manager.toml`, loaded with `serde` + `toml` (§6.6).

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    7890
}
fn default_channel_path() -> String {
    "/ws/agent".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_ping_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_pong_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_offline_threshold() -> Duration {
    Duration::from_secs(90)
}
fn default_flush_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_health_sweep_interval() -> Duration {
    Duration::from_secs(10)
}
fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_settle_delay() -> Duration {
    Duration::from_millis(500)
}

/// Top-level Manager configuration (§6.6), with every tunable from §6.5
/// defaulted to the values given there when absent from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Control-channel upgrade path (§6.1).
    #[serde(default = "default_channel_path")]
    pub channel_path: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_ping_interval", with = "humantime_serde")]
    pub ping_interval: Duration,

    #[serde(default = "default_pong_timeout", with = "humantime_serde")]
    pub pong_timeout: Duration,

    #[serde(default = "default_offline_threshold", with = "humantime_serde")]
    pub offline_threshold: Duration,

    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    #[serde(default = "default_health_sweep_interval", with = "humantime_serde")]
    pub health_sweep_interval: Duration,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            host: default_host(),
            port: default_port(),
            channel_path: default_channel_path(),
            log_level: default_log_level(),
            ping_interval: default_ping_interval(),
            pong_timeout: default_pong_timeout(),
            offline_threshold: default_offline_threshold(),
            flush_interval: default_flush_interval(),
            health_sweep_interval: default_health_sweep_interval(),
            probe_timeout: default_probe_timeout(),
            settle_delay: default_settle_delay(),
        }
    }
}

impl ManagerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
