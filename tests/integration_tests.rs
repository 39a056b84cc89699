//! Integration tests for the regime-strategies system
//!
//! These tests verify that all components work together correctly.

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

use regime_strategies::data::{self, timeframe_duration, TimedReadings};
use regime_strategies::features::{FeatureBuilder, FeatureConfig, FEATURE_COLUMNS};
use regime_strategies::labeler::{LabelConfig, Labeler};
use regime_strategies::multi_timeframe::project_readings;
use regime_strategies::pipeline::{trail_stop, Pipeline};
use regime_strategies::ratchet::{RatchetConfig, StopRatchet};
use regime_strategies::setup::{SetupConfig, SetupMachine};
use regime_strategies::{
    Candle, Config, EntryDecision, Regime, RegimeConfidence, RegimeReading, Side, Symbol,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Generate mock candle data: two overlapping waves plus a slow drift
fn generate_mock_candles(count: usize, step: Duration, base_price: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let x = i as f64;
            let close = base_price
                + (x * 0.15).sin() * base_price * 0.04
                + (x * 0.037).cos() * base_price * 0.06
                + x * base_price * 0.0002;
            let open = close - (x * 0.9).sin() * base_price * 0.003;
            let wick = base_price * 0.004;
            Candle::new(
                start_time() + step * i as i32,
                open,
                open.max(close) + wick,
                open.min(close) - wick,
                close,
                1_000.0 + (x * 0.4).sin().abs() * 500.0,
            )
            .unwrap()
        })
        .collect()
}

fn write_candles(path: &PathBuf, candles: &[Candle]) {
    let mut text = String::from("datetime,open,high,low,close,volume\n");
    for c in candles {
        text.push_str(&format!(
            "{},{},{},{},{},{}\n",
            c.datetime.format("%Y-%m-%d %H:%M:%S"),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        ));
    }
    std::fs::write(path, text).unwrap();
}

fn temp_workspace(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("regime_it_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.join("data")).unwrap();
    dir
}

fn small_config(workspace: &PathBuf) -> Config {
    let mut config = Config::default();
    config.data.data_dir = workspace.join("data").display().to_string();
    config.data.results_dir = workspace.join("results").display().to_string();
    config.data.pairs = vec!["BTCUSDT".to_string()];
    config.features.valuation_period = 50;
    config.labels.horizon = 6;
    config.setup = SetupConfig {
        trend_period: 60,
        band_period: 20,
        ..SetupConfig::default()
    };
    config
}

fn bull() -> RegimeReading {
    RegimeReading::available(Regime::Bull, RegimeConfidence::new(0.1, 0.2, 0.7))
}

fn bear() -> RegimeReading {
    RegimeReading::available(Regime::Bear, RegimeConfidence::new(0.7, 0.2, 0.1))
}

// =============================================================================
// End-to-end
// =============================================================================

#[test]
fn test_label_then_scan_from_csv() {
    let workspace = temp_workspace("e2e");
    let config = small_config(&workspace);
    let pair = Symbol::new("BTCUSDT");

    let coarse = generate_mock_candles(150, Duration::hours(4), 40_000.0);
    let fine = generate_mock_candles(400, Duration::minutes(15), 40_000.0);
    write_candles(&data::candle_path(&config.data.data_dir, &pair, "4h"), &coarse);
    write_candles(&data::candle_path(&config.data.data_dir, &pair, "15m"), &fine);

    let pipeline = Pipeline::new(config.clone()).unwrap();

    let regime_data = data::load_pair_timeframes(
        &config.data.data_dir,
        &config.data.symbols(),
        &["4h"],
        "4h",
        None,
        None,
    )
    .unwrap();
    let training = pipeline.label_pairs(&regime_data).unwrap();
    assert_eq!(training.len(), 1);
    assert_eq!(training[0].candles, 150);
    assert_eq!(training[0].summary.total(), 150);
    assert_eq!(training[0].summary.truncated, 6);
    assert!(training[0].output.exists());

    let header = std::fs::read_to_string(&training[0].output).unwrap();
    let header = header.lines().next().unwrap();
    for column in FEATURE_COLUMNS {
        assert!(header.contains(column), "missing {} in {}", column, header);
    }
    assert!(header.contains("regime_label"));

    // Pretend the classifier predicted BULL for every coarse candle
    let predictions_path = workspace.join("results").join("BTCUSDT_4h_predictions.csv");
    let mut text = String::from("datetime,BEAR,NEUTRAL,BULL\n");
    for c in &coarse {
        text.push_str(&format!("{},0.1,0.2,0.7\n", c.datetime.format("%Y-%m-%d %H:%M:%S")));
    }
    std::fs::write(&predictions_path, text).unwrap();
    let readings = data::load_predictions(&predictions_path).unwrap();

    let entry_data = data::load_pair_timeframes(
        &config.data.data_dir,
        &config.data.symbols(),
        &["15m"],
        "15m",
        None,
        None,
    )
    .unwrap();
    let predictions: HashMap<Symbol, TimedReadings> = [(pair.clone(), readings)].into_iter().collect();
    let scans = pipeline.scan_pairs(&entry_data, &predictions).unwrap();

    assert_eq!(scans.len(), 1);
    let scan = &scans[0];
    assert_eq!(scan.candles, 400);
    assert_eq!(scan.last_reading.regime(), Some(Regime::Bull));
    // A BULL regime never lets a short through
    assert_eq!(scan.short_entries, 0);
    assert!(scan.output.exists());

    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn test_scan_without_predictions_is_unfiltered() {
    let workspace = temp_workspace("nopred");
    let config = small_config(&workspace);
    let pair = Symbol::new("BTCUSDT");

    let fine = generate_mock_candles(300, Duration::minutes(15), 2_000.0);
    write_candles(&data::candle_path(&config.data.data_dir, &pair, "15m"), &fine);

    let pipeline = Pipeline::new(config.clone()).unwrap();
    let entry_data = data::load_pair_timeframes(
        &config.data.data_dir,
        &config.data.symbols(),
        &["15m"],
        "15m",
        None,
        None,
    )
    .unwrap();

    let scans = pipeline.scan_pairs(&entry_data, &HashMap::new()).unwrap();
    assert_eq!(scans[0].last_reading, RegimeReading::Unavailable);
    // The trend gate needs an explicit regime
    assert_eq!(scans[0].trend_entries, 0);

    let _ = std::fs::remove_dir_all(&workspace);
}

// =============================================================================
// No lookahead
// =============================================================================

#[test]
fn test_features_do_not_look_ahead() {
    let candles = generate_mock_candles(260, Duration::hours(4), 100.0);
    let builder = FeatureBuilder::new(FeatureConfig {
        valuation_period: 60,
        ..FeatureConfig::default()
    })
    .unwrap();
    let full = builder.compute(&candles).unwrap();

    for cut in [30, 61, 150, 259] {
        let prefix = builder.compute(&candles[..=cut]).unwrap();
        for name in FEATURE_COLUMNS {
            let a = full.get(name).unwrap()[cut];
            let b = prefix.get(name).unwrap()[cut];
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
        assert_eq!(full.ready[cut], prefix.ready[cut]);
    }
}

#[test]
fn test_setup_machine_does_not_look_ahead() {
    let candles = generate_mock_candles(400, Duration::minutes(15), 50.0);
    let readings = vec![RegimeReading::Unavailable; candles.len()];
    let machine = SetupMachine::new(SetupConfig {
        trend_period: 60,
        band_period: 20,
        ..SetupConfig::default()
    })
    .unwrap();
    let full = machine.evaluate(&candles, &readings).unwrap();

    for cut in [100, 250, 399] {
        let prefix = machine
            .evaluate(&candles[..=cut], &readings[..=cut])
            .unwrap();
        assert_eq!(&full.states[..=cut], &prefix.states[..]);
        assert_eq!(&full.entries[..=cut], &prefix.entries[..]);
    }
}

#[test]
fn test_labels_only_depend_on_the_forward_window() {
    let candles = generate_mock_candles(200, Duration::hours(4), 100.0);
    let labeler = Labeler::new(LabelConfig::default()).unwrap();
    let full = labeler.label(&candles).unwrap();

    // Dropping candles beyond i + horizon cannot change label i
    let horizon = labeler.config().horizon;
    let cut = 150;
    let shorter = labeler.label(&candles[..=cut + horizon]).unwrap();
    assert_eq!(&full.regimes[..=cut], &shorter.regimes[..=cut]);
}

// =============================================================================
// Regime projection and filtering
// =============================================================================

#[test]
fn test_projection_is_causal() {
    let coarse_tf = timeframe_duration("4h").unwrap();
    let fine_tf = timeframe_duration("15m").unwrap();
    let fine = generate_mock_candles(64, fine_tf, 100.0);
    let coarse: TimedReadings = (0..4)
        .map(|i| (start_time() + coarse_tf * i, if i % 2 == 0 { bull() } else { bear() }))
        .collect();

    let projected = project_readings(&coarse, coarse_tf, &fine, fine_tf);
    assert_eq!(projected.len(), fine.len());

    for (candle, reading) in fine.iter().zip(&projected) {
        let fine_close = candle.datetime + fine_tf;
        let visible = coarse
            .iter()
            .filter(|(open, _)| *open + coarse_tf <= fine_close)
            .last()
            .map(|(_, r)| *r)
            .unwrap_or(RegimeReading::Unavailable);
        assert_eq!(*reading, visible);
    }

    // First 4h candle closes with the 16th 15m candle
    assert_eq!(projected[14], RegimeReading::Unavailable);
    assert_eq!(projected[15], bull());
}

#[test]
fn test_bear_regime_blocks_long_entries() {
    let candles = generate_mock_candles(400, Duration::minutes(15), 50.0);
    let machine = SetupMachine::new(SetupConfig {
        trend_period: 60,
        band_period: 20,
        ..SetupConfig::default()
    })
    .unwrap();

    let bearish = machine
        .evaluate(&candles, &vec![bear(); candles.len()])
        .unwrap();
    assert!(bearish.entries.iter().all(|e| *e != EntryDecision::Long));

    let bullish = machine
        .evaluate(&candles, &vec![bull(); candles.len()])
        .unwrap();
    assert!(bullish.entries.iter().all(|e| *e != EntryDecision::Short));
}

// =============================================================================
// Stop ratchet
// =============================================================================

#[test]
fn test_trailed_stop_never_loosens() {
    let candles = generate_mock_candles(300, Duration::minutes(15), 100.0);
    let machine = SetupMachine::new(SetupConfig {
        trend_period: 60,
        band_period: 20,
        ..SetupConfig::default()
    })
    .unwrap();
    let indicators = machine.indicators(&candles);
    let pair = Symbol::new("BTCUSDT");
    let config = RatchetConfig {
        breakeven_trigger: Some(0.01),
        ..RatchetConfig::default()
    };

    for side in [Side::Long, Side::Short] {
        let mut previous: Option<f64> = None;
        for end in 101..200 {
            let stop = trail_stop(
                StopRatchet::new(config.clone()).unwrap(),
                &pair,
                &candles[..end],
                &indicators,
                100,
                side,
            )
            .unwrap()
            .stop_price;

            if let Some(prev) = previous {
                match side {
                    Side::Long => assert!(stop >= prev - 1e-9, "long stop loosened {} -> {}", prev, stop),
                    Side::Short => assert!(stop <= prev + 1e-9, "short stop loosened {} -> {}", prev, stop),
                }
            }
            previous = Some(stop);
        }
    }
}

#[test]
fn test_default_config_file_loads() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configs/default.json");
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.regime_timeframe(), "4h");
    assert_eq!(config.data.entry_timeframe, "15m");
}
