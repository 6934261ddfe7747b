use std::fs;
use std::path::Path;

use tracing::warn;

use crate::config::Config;
use crate::error::{LoiterError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| LoiterError::Config(format!("Failed to read config file: {e}")))?;
    let cfg: Config = toml::from_str(&txt)
        .map_err(|e| LoiterError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.enabled && cfg.table.is_none() {
        return Err(LoiterError::Config(
            "missing required 'table' path; the engine cannot run without one".into(),
        ));
    }

    if cfg.rules.low < 1 {
        return Err(LoiterError::Config("low watermark must be >= 1".into()));
    }

    if cfg.rules.high < 1 {
        return Err(LoiterError::Config("high watermark must be >= 1".into()));
    }

    if !(1..=100).contains(&cfg.rules.rate) {
        return Err(LoiterError::Config("rate must be 1 <= r <= 100".into()));
    }

    // An inverted range is degenerate but not fatal: the policy collapses it
    // to a single threshold.
    if cfg.rules.high <= cfg.rules.low {
        warn!(
            low = cfg.rules.low,
            high = cfg.rules.high,
            "high watermark does not exceed low watermark; every connection at \
             or above the low watermark will be dropped"
        );
    }

    Ok(())
}
