//! Subcommand implementations

pub mod label;
pub mod scan;

use anyhow::Result;
use regime_strategies::data::parse_date;
use regime_strategies::Config;
use tracing::info;

/// Load the config file and apply command-line overrides
pub(crate) fn load_config(
    config_path: &str,
    pairs_override: Option<String>,
    start_override: Option<String>,
    end_override: Option<String>,
) -> Result<Config> {
    let mut config = Config::from_file(config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(pairs) = pairs_override {
        let pairs: Vec<String> = pairs
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        info!("Overriding pairs to: {:?}", pairs);
        config.data.pairs = pairs;
    }

    if let Some(start) = start_override {
        info!("Overriding start date to: {}", start);
        config.data.start = Some(start);
    }

    if let Some(end) = end_override {
        info!("Overriding end date to: {}", end);
        config.data.end = Some(end);
    }

    config.validate()?;
    Ok(config)
}

/// Parsed `data.start` / `data.end`
pub(crate) fn date_range(
    config: &Config,
) -> Result<(Option<chrono::DateTime<chrono::Utc>>, Option<chrono::DateTime<chrono::Utc>>)> {
    let start = config.data.start.as_deref().map(parse_date).transpose()?;
    let end = config.data.end.as_deref().map(parse_date).transpose()?;
    Ok((start, end))
}
