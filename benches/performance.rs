//! Performance benchmarks for regime-strategies
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use regime_strategies::features::{FeatureBuilder, FeatureConfig};
use regime_strategies::indicators;
use regime_strategies::labeler::{LabelConfig, Labeler};
use regime_strategies::setup::{SetupConfig, SetupMachine};
use regime_strategies::{Candle, RegimeReading};

fn mock_candles(count: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let x = i as f64;
            let close = 20_000.0 + (x * 0.05).sin() * 800.0 + (x * 0.013).cos() * 1500.0 + x * 0.4;
            let open = close - (x * 0.7).sin() * 40.0;
            Candle::new_unchecked(
                start + Duration::minutes(15 * i as i64),
                open,
                open.max(close) + 25.0,
                open.min(close) - 25.0,
                close,
                1_000.0 + (x * 0.3).cos().abs() * 400.0,
            )
        })
        .collect()
}

fn benchmark_indicators(c: &mut Criterion) {
    let candles = mock_candles(10_000);
    let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let close: Vec<f64> = candles.iter().map(|c| c.close).collect();

    c.bench_function("atr_14_10k", |b| {
        b.iter(|| indicators::atr(black_box(&high), black_box(&low), black_box(&close), 14))
    });
    c.bench_function("kama_10_10k", |b| {
        b.iter(|| indicators::kama(black_box(&close), 10, 2, 30))
    });
    c.bench_function("rolling_max_200_10k", |b| {
        b.iter(|| indicators::rolling_max(black_box(&high), 200))
    });
}

fn benchmark_regime_timeframe(c: &mut Criterion) {
    let candles = mock_candles(10_000);
    let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();
    let labeler = Labeler::new(LabelConfig::default()).unwrap();

    c.bench_function("features_10k", |b| b.iter(|| builder.compute(black_box(&candles))));
    c.bench_function("labels_10k", |b| b.iter(|| labeler.label(black_box(&candles))));
}

fn benchmark_setup_machine(c: &mut Criterion) {
    let candles = mock_candles(10_000);
    let readings = vec![RegimeReading::Unavailable; candles.len()];
    let machine = SetupMachine::new(SetupConfig::default()).unwrap();

    c.bench_function("setup_machine_10k", |b| {
        b.iter(|| machine.evaluate(black_box(&candles), black_box(&readings)))
    });
}

criterion_group!(
    benches,
    benchmark_indicators,
    benchmark_regime_timeframe,
    benchmark_setup_machine
);
criterion_main!(benches);
