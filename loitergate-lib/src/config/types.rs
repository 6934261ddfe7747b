use std::path::PathBuf;

use serde::Deserialize;

use crate::policy::{Watermarks, DEFAULT_HIGH, DEFAULT_LOW, DEFAULT_RATE};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Enable the admission engine
    /// Default: false
    #[serde(default)]
    pub enabled: bool,
    /// Path anchoring the shared counter region
    /// Required when the engine is enabled; every worker process must be
    /// given the same path
    pub table: Option<PathBuf>,
    /// Decision log file (optional)
    /// One line per dropped connection or consistency fault is appended.
    /// The literal value "none" disables it, same as leaving it unset
    pub log: Option<PathBuf>,
    /// Message sent to a rejected client before disconnect (optional)
    pub reject_message: Option<String>,
    /// Watermark rules for the drop ramp
    #[serde(default)]
    pub rules: RulesConfig,
    /// Global ceiling on concurrent sessions, when the host enforces one
    /// When set and the high watermark exceeds it, both watermarks are
    /// rescaled down preserving their ratio
    pub capacity_limit: Option<u32>,
}

impl Config {
    /// Decision-log path with the `"none"` sentinel collapsed to `None`.
    pub fn log_path(&self) -> Option<&PathBuf> {
        self.log
            .as_ref()
            .filter(|p| !p.as_os_str().eq_ignore_ascii_case("none"))
    }
}

/// Watermark rules configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RulesConfig {
    /// Loitering-connection count below which nothing is dropped
    /// Default: 20
    #[serde(default = "default_low")]
    pub low: u32,
    /// Loitering-connection count at or above which everything is dropped
    /// Default: 100
    #[serde(default = "default_high")]
    pub high: u32,
    /// Drop probability in percent at the low watermark; 100 drops
    /// unconditionally once the low watermark is reached
    /// Default: 30
    #[serde(default = "default_rate")]
    pub rate: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self { low: default_low(), high: default_high(), rate: default_rate() }
    }
}

impl RulesConfig {
    pub fn watermarks(&self) -> Watermarks {
        Watermarks { low: self.low, high: self.high, rate: self.rate }
    }
}

fn default_low() -> u32 {
    DEFAULT_LOW
}

fn default_high() -> u32 {
    DEFAULT_HIGH
}

fn default_rate() -> u32 {
    DEFAULT_RATE
}
