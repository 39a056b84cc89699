//! Scan command implementation

use anyhow::Result;
use chrono::Utc;
use itertools::Itertools;
use regime_strategies::data::{self, TimedReadings};
use regime_strategies::pipeline::Pipeline;
use regime_strategies::relay;
use regime_strategies::Symbol;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// `{PAIR}_{timeframe}_predictions.csv` for every pair that has one
fn load_all_predictions(dir: &Path, pairs: &[Symbol], timeframe: &str) -> HashMap<Symbol, TimedReadings> {
    let mut predictions = HashMap::new();

    for pair in pairs {
        let path = dir.join(format!("{}_{}_predictions.csv", pair.file_stem(), timeframe));
        if !path.exists() {
            debug!("No predictions for {} at {}", pair, path.display());
            continue;
        }

        match data::load_predictions(&path) {
            Ok(readings) => {
                info!("Loaded {} regime readings for {}", readings.len(), pair);
                predictions.insert(pair.clone(), readings);
            }
            Err(e) => warn!("Ignoring predictions for {}: {:#}", pair, e),
        }
    }

    predictions
}

pub fn run(
    config_path: String,
    pairs_override: Option<String>,
    predictions_dir: Option<PathBuf>,
    hold_secs: u64,
    start_override: Option<String>,
    end_override: Option<String>,
) -> Result<()> {
    info!("Starting entry scan");

    let config = super::load_config(&config_path, pairs_override, start_override, end_override)?;
    let (start, end) = super::date_range(&config)?;
    let entry_tf = config.data.entry_timeframe.clone();

    let symbols = config.data.symbols();
    debug!("Pairs: {}", symbols.iter().join(", "));

    let data = data::load_pair_timeframes(
        &config.data.data_dir,
        &symbols,
        &[entry_tf.as_str()],
        &entry_tf,
        start,
        end,
    )?;
    info!("Loaded data for {} pairs", data.len());

    let predictions_dir = predictions_dir.unwrap_or_else(|| PathBuf::from(&config.data.results_dir));
    info!("Reading regime predictions from: {}", predictions_dir.display());
    let predictions = load_all_predictions(&predictions_dir, &symbols, config.regime_timeframe());

    let pipeline = Pipeline::new(config.clone())?;
    let reports = pipeline.scan_pairs(&data, &predictions)?;

    // Hand the latest reading of every pair to the regime relay
    let (broadcaster, mut listener) = relay::channel(config.relay.capacity);
    let relayed = relay::relay_readings(
        &broadcaster,
        &mut listener,
        Utc::now(),
        reports.iter().map(|r| (&r.pair, r.last_reading)),
    );
    debug!("Relayed {} regime signals", relayed);

    println!("\n{}", "=".repeat(60));
    println!("ENTRY SCAN ({}, regime on {})", entry_tf, config.regime_timeframe());
    println!("{}", "=".repeat(60));

    for report in reports.iter().sorted_by(|a, b| a.pair.cmp(&b.pair)) {
        println!("{}", "-".repeat(60));
        println!("Pair:               {}", report.pair);
        println!("Candles:            {}", report.candles);
        println!(
            "Band entries:       {} long / {} short",
            report.long_entries, report.short_entries
        );
        println!("Trend entries:      {}", report.trend_entries);
        println!("Setup state:        {:?}", report.last_state);
        println!("Regime:             {}", listener.current(&report.pair).label());

        match &report.last_entry {
            Some(entry) => {
                println!(
                    "Last entry:         {:?} @ {:.4} on {}",
                    entry.side,
                    entry.open_rate,
                    entry.datetime.format("%Y-%m-%d %H:%M")
                );
                println!(
                    "Stop:               {:.4} ({:.2}% from entry){}",
                    entry.stop.stop_price,
                    entry.stop.stop_ratio * 100.0,
                    if entry.stop.tightened { ", tightened" } else { "" }
                );
            }
            None => println!("Last entry:         none"),
        }
        println!("Output:             {}", report.output.display());
    }
    println!("{}", "=".repeat(60));

    if hold_secs > 0 {
        let period = Duration::from_secs(config.relay.heartbeat_secs);
        info!(
            "Holding the regime relay for {}s (heartbeat every {}s)",
            hold_secs, config.relay.heartbeat_secs
        );

        let runtime = tokio::runtime::Runtime::new()?;
        let received = runtime.block_on(relay::serve_latest(
            broadcaster,
            &mut listener,
            period,
            Duration::from_secs(hold_secs),
            |signal| match signal.to_json() {
                Ok(json) => info!("{}", json),
                Err(e) => warn!("Failed to encode {} signal: {}", signal.pair, e),
            },
        ));
        info!("Relay hold ended after {} signals", received);
    }

    info!("Scan completed for {} pairs", reports.len());

    Ok(())
}
