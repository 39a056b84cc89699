//! Label command implementation

use anyhow::Result;
use itertools::Itertools;
use regime_strategies::data;
use regime_strategies::pipeline::Pipeline;
use regime_strategies::Regime;
use tracing::{debug, info};

pub fn run(
    config_path: String,
    pairs_override: Option<String>,
    start_override: Option<String>,
    end_override: Option<String>,
) -> Result<()> {
    info!("Starting regime labeling");

    let config = super::load_config(&config_path, pairs_override, start_override, end_override)?;
    let (start, end) = super::date_range(&config)?;
    let timeframe = config.regime_timeframe().to_string();

    info!("Loading {} data from: {}", timeframe, config.data.data_dir);
    let symbols = config.data.symbols();
    debug!("Pairs: {}", symbols.iter().join(", "));

    let data = data::load_pair_timeframes(
        &config.data.data_dir,
        &symbols,
        &[timeframe.as_str()],
        &timeframe,
        start,
        end,
    )?;
    info!("Loaded data for {} pairs", data.len());

    let pipeline = Pipeline::new(config.clone())?;
    let reports = pipeline.label_pairs(&data)?;

    println!("\n{}", "=".repeat(60));
    println!("REGIME LABELS ({})", timeframe);
    println!("{}", "=".repeat(60));
    println!(
        "Horizon:            {} candles, barriers {:.2} x ATR({})",
        config.labels.horizon, config.labels.atr_multiple, config.labels.atr_period
    );

    for report in reports.iter().sorted_by(|a, b| a.pair.cmp(&b.pair)) {
        let s = &report.summary;
        println!("{}", "-".repeat(60));
        println!("Pair:               {}", report.pair);
        println!("Candles:            {} ({} feature-ready)", report.candles, report.ready);
        println!(
            "Bull / Neutral / Bear: {} / {} / {}  ({:.1}% / {:.1}% / {:.1}%)",
            s.bull,
            s.neutral,
            s.bear,
            s.share(Regime::Bull),
            s.share(Regime::Neutral),
            s.share(Regime::Bear),
        );
        println!(
            "Measured:           {} (warmup {}, truncated {})",
            s.measured, s.warmup, s.truncated
        );
        println!("Output:             {}", report.output.display());
    }
    println!("{}", "=".repeat(60));

    info!("Labeling completed for {} pairs", reports.len());

    Ok(())
}
