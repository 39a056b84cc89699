//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides for data and results directories.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::data::{parse_date, timeframe_duration};
use crate::features::FeatureConfig;
use crate::labeler::LabelConfig;
use crate::ratchet::RatchetConfig;
use crate::setup::{SetupConfig, TrendConfig};
use crate::Symbol;

pub const DATA_DIR_ENV: &str = "REGIME_DATA_DIR";
pub const RESULTS_DIR_ENV: &str = "REGIME_RESULTS_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub features: FeatureConfig,
    pub labels: LabelConfig,
    pub setup: SetupConfig,
    pub trend: TrendConfig,
    pub ratchet: RatchetConfig,
    pub relay: RelayConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env();
        config.validate()?;

        Ok(config)
    }

    /// Directory overrides from the environment (or a `.env` file)
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            self.data.data_dir = dir;
        }
        if let Ok(dir) = std::env::var(RESULTS_DIR_ENV) {
            self.data.results_dir = dir;
        }
    }

    /// Reject bad parameters before any work is done
    pub fn validate(&self) -> Result<()> {
        self.features.validate().context("Invalid features section")?;
        self.labels.validate().context("Invalid labels section")?;
        self.setup.validate().context("Invalid setup section")?;
        self.trend.validate().context("Invalid trend section")?;
        self.ratchet.validate().context("Invalid ratchet section")?;

        timeframe_duration(&self.features.timeframe).context("Invalid features.timeframe")?;
        timeframe_duration(&self.data.entry_timeframe).context("Invalid data.entry_timeframe")?;

        if self.data.pairs.is_empty() {
            anyhow::bail!("data.pairs must list at least one pair");
        }
        if self.relay.heartbeat_secs == 0 {
            anyhow::bail!("relay.heartbeat_secs must be at least 1");
        }

        let start = self.data.start.as_deref().map(parse_date).transpose()?;
        let end = self.data.end.as_deref().map(parse_date).transpose()?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                anyhow::bail!("data.start {} is after data.end {}", s, e);
            }
        }

        Ok(())
    }

    /// Timeframe the classifier runs on
    pub fn regime_timeframe(&self) -> &str {
        &self.features.timeframe
    }
}

/// Input/output locations and the pairs to process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: String,
    pub results_dir: String,
    pub pairs: Vec<String>,
    /// Timeframe entries are evaluated on
    pub entry_timeframe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            data_dir: "data".to_string(),
            results_dir: "results".to_string(),
            pairs: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
            entry_timeframe: "15m".to_string(),
            start: None,
            end: None,
        }
    }
}

impl DataConfig {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.pairs.iter().map(Symbol::new).collect()
    }
}

/// Regime signal relay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bounded channel capacity
    pub capacity: usize,
    /// Seconds between republishing the latest readings
    pub heartbeat_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            capacity: 16,
            heartbeat_secs: 60,
        }
    }
}
