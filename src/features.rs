//! Regime feature builder
//!
//! Computes the six regime descriptors fed to the classifier. Features only
//! exist on the designated regime timeframe: frames of any other timeframe
//! pass through untouched, because the set of columns present is part of the
//! model input contract.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::validate_sequence;
use crate::error::{require_period, SeriesError, SeriesResult};
use crate::frame::{CandleFrame, Column};
use crate::indicators::{
    choppiness, forward_fill, kama, obv, pct_change, rolling_max, safe_ratio, sma,
};
use crate::Candle;

pub const CHOP: &str = "%regime_chop";
pub const TREND_KAMA_DIST: &str = "%trend_kama_dist";
pub const VALUATION: &str = "%val_ltvd";
pub const FEAR_VIXFIX: &str = "%fear_vixfix";
pub const OBV_OSC: &str = "%truth_obv_osc";
pub const PCT_CHANGE: &str = "%pct-change";
/// False where any feature value is a warm-up zero or a forward-filled gap
pub const FEATURES_READY: &str = "features_ready";

/// All feature column names, in computation order
pub const FEATURE_COLUMNS: [&str; 6] = [
    CHOP,
    TREND_KAMA_DIST,
    VALUATION,
    FEAR_VIXFIX,
    OBV_OSC,
    PCT_CHANGE,
];

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Only frames of this timeframe receive features
    pub timeframe: String,
    pub chop_period: usize,
    pub kama_period: usize,
    pub kama_fast: usize,
    pub kama_slow: usize,
    /// Long-term SMA used for the valuation distance
    pub valuation_period: usize,
    /// Lookback of the highest close in the fear index
    pub fear_period: usize,
    pub obv_ma_period: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            timeframe: "4h".to_string(),
            chop_period: 14,
            kama_period: 10,
            kama_fast: 2,
            kama_slow: 30,
            valuation_period: 200,
            fear_period: 22,
            obv_ma_period: 20,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> SeriesResult<()> {
        require_period("chop_period", self.chop_period)?;
        if self.chop_period < 2 {
            return Err(SeriesError::invalid("chop_period", "must be at least 2"));
        }
        require_period("kama_period", self.kama_period)?;
        require_period("kama_fast", self.kama_fast)?;
        require_period("kama_slow", self.kama_slow)?;
        if self.kama_fast > self.kama_slow {
            return Err(SeriesError::invalid(
                "kama_fast",
                format!("{} is slower than kama_slow {}", self.kama_fast, self.kama_slow),
            ));
        }
        require_period("valuation_period", self.valuation_period)?;
        require_period("fear_period", self.fear_period)?;
        require_period("obv_ma_period", self.obv_ma_period)?;
        if self.timeframe.trim().is_empty() {
            return Err(SeriesError::invalid("timeframe", "must not be empty"));
        }
        Ok(())
    }

    /// Candles needed before every feature is defined
    pub fn warmup_candles(&self) -> usize {
        [
            self.chop_period,
            self.kama_period,
            self.valuation_period,
            self.fear_period,
            self.obv_ma_period,
            2,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Computed features for one candle sequence
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    /// (column name, values) in `FEATURE_COLUMNS` order; never NaN
    pub columns: Vec<(&'static str, Vec<f64>)>,
    /// True where every feature had real history behind it
    pub ready: Vec<bool>,
}

impl FeatureSet {
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn ready_count(&self) -> usize {
        self.ready.iter().filter(|r| **r).count()
    }
}

#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> SeriesResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn applies_to(&self, timeframe: &str) -> bool {
        self.config.timeframe == timeframe
    }

    /// Compute all features for `candles`.
    ///
    /// Gaps are forward-filled. Candles before a feature's first defined value
    /// are written as 0.0. Any candle where a feature had to be filled, during
    /// warm-up or in a later gap, is marked not ready.
    pub fn compute(&self, candles: &[Candle]) -> SeriesResult<FeatureSet> {
        validate_sequence(candles)?;
        let cfg = &self.config;
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let chop = choppiness(&high, &low, &close, cfg.chop_period);

        let kama_line = kama(&close, cfg.kama_period, cfg.kama_fast, cfg.kama_slow);
        let kama_dist = ratio_series(&close, &kama_line, |c, k| (c - k, k));

        let long_sma = sma(&close, cfg.valuation_period);
        let valuation = ratio_series(&close, &long_sma, |c, m| (c - m, c));

        let highest_close = rolling_max(&close, cfg.fear_period);
        let fear: Vec<Option<f64>> = highest_close
            .iter()
            .zip(&low)
            .map(|(hh, &l)| hh.and_then(|hh| safe_ratio(hh - l, hh)).map(|r| r * 100.0))
            .collect();

        let obv_line = obv(candles);
        let obv_ma = sma(&obv_line, cfg.obv_ma_period);
        let obv_osc = ratio_series(&obv_line, &obv_ma, |o, m| (o - m, m));

        let pct = pct_change(&close);

        let raw = [chop, kama_dist, valuation, fear, obv_osc, pct];
        let mut ready = vec![true; candles.len()];
        let mut columns = Vec::with_capacity(FEATURE_COLUMNS.len());

        for (name, series) in FEATURE_COLUMNS.into_iter().zip(raw) {
            // A forward-filled cell is a stand-in, not a measurement
            for (flag, raw_value) in ready.iter_mut().zip(&series) {
                if raw_value.is_none() {
                    *flag = false;
                }
            }
            let values: Vec<f64> = forward_fill(&series)
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect();
            columns.push((name, values));
        }

        Ok(FeatureSet { columns, ready })
    }

    /// Append feature columns to `frame` when it is on the regime timeframe.
    ///
    /// Returns whether columns were written.
    pub fn populate(&self, frame: &mut CandleFrame) -> SeriesResult<bool> {
        if !self.applies_to(frame.timeframe()) {
            debug!(
                "{} {}: not the regime timeframe ({}), features skipped",
                frame.pair(),
                frame.timeframe(),
                self.config.timeframe
            );
            return Ok(false);
        }

        let set = self.compute(frame.candles())?;
        let ready = set.ready_count();
        if ready == 0 {
            warn!(
                "{} {}: no candle has full feature history ({} candles, need {})",
                frame.pair(),
                frame.timeframe(),
                frame.len(),
                self.config.warmup_candles()
            );
        } else {
            debug!("{} {}: {} of {} candles feature-ready", frame.pair(), frame.timeframe(), ready, frame.len());
        }

        for (name, values) in set.columns {
            frame.insert_column(name, Column::Float(values))?;
        }
        frame.insert_column(FEATURES_READY, Column::Flag(set.ready))?;

        Ok(true)
    }
}

/// Map a base series and an optional reference to a NaN-safe ratio
fn ratio_series(
    base: &[f64],
    reference: &[Option<f64>],
    parts: impl Fn(f64, f64) -> (f64, f64),
) -> Vec<Option<f64>> {
    base.iter()
        .zip(reference)
        .map(|(&b, r)| {
            r.and_then(|r| {
                let (num, den) = parts(b, r);
                safe_ratio(num, den)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1;
                Candle::new(
                    start + Duration::hours(4 * i as i64),
                    base,
                    base + 2.0,
                    base - 2.0,
                    base + 0.5,
                    1000.0 + (i % 7) as f64 * 10.0,
                )
                .unwrap()
            })
            .collect()
    }

    fn small_config() -> FeatureConfig {
        FeatureConfig {
            valuation_period: 30,
            ..FeatureConfig::default()
        }
    }

    #[test]
    fn test_gatekeeping() {
        let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();

        let mut other = CandleFrame::new(Symbol::new("BTCUSDT"), "15m", candles(50)).unwrap();
        assert!(!builder.populate(&mut other).unwrap());
        assert_eq!(other.column_names().count(), 0);

        let mut regime = CandleFrame::new(Symbol::new("BTCUSDT"), "4h", candles(50)).unwrap();
        assert!(builder.populate(&mut regime).unwrap());
        for name in FEATURE_COLUMNS {
            assert!(regime.has_column(name), "missing {}", name);
        }
        assert!(regime.has_column(FEATURES_READY));
    }

    #[test]
    fn test_no_nan_and_ready_after_warmup() {
        let config = small_config();
        let warmup = config.warmup_candles();
        let builder = FeatureBuilder::new(config).unwrap();
        let set = builder.compute(&candles(80)).unwrap();

        for (name, values) in &set.columns {
            assert!(values.iter().all(|v| v.is_finite()), "{} has NaN", name);
        }
        assert!(!set.ready[0]);
        assert!(!set.ready[warmup - 2]);
        assert!(set.ready[warmup..].iter().all(|r| *r));
    }

    #[test]
    fn test_short_history_is_never_ready() {
        let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();
        let set = builder.compute(&candles(40)).unwrap();
        assert_eq!(set.ready_count(), 0);
        assert!(set.get(VALUATION).unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_feature_values() {
        let builder = FeatureBuilder::new(small_config()).unwrap();
        let data = candles(60);
        let set = builder.compute(&data).unwrap();

        let pct = set.get(PCT_CHANGE).unwrap();
        assert_relative_eq!(pct[1], (data[1].close - data[0].close) / data[0].close);

        let fear = set.get(FEAR_VIXFIX).unwrap();
        assert!(fear[30..].iter().all(|v| *v >= 0.0));

        let chop = set.get(CHOP).unwrap();
        assert!(chop[20..].iter().all(|v| *v > 0.0));
    }

    #[test]
    fn test_idempotent() {
        let builder = FeatureBuilder::new(small_config()).unwrap();
        let data = candles(70);
        assert_eq!(builder.compute(&data).unwrap(), builder.compute(&data).unwrap());
    }

    #[test]
    fn test_filled_gap_is_not_ready() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Rising for 30 candles, then a dead-flat stretch with zero range
        let data: Vec<Candle> = (0..60)
            .map(|i| {
                let t = start + Duration::hours(4 * i as i64);
                if i < 30 {
                    let c = 100.0 + i as f64;
                    Candle::new(t, c - 0.5, c + 1.0, c - 1.0, c, 100.0).unwrap()
                } else {
                    Candle::new(t, 130.0, 130.0, 130.0, 130.0, 100.0).unwrap()
                }
            })
            .collect();
        let builder = FeatureBuilder::new(FeatureConfig {
            valuation_period: 10,
            fear_period: 5,
            obv_ma_period: 5,
            ..FeatureConfig::default()
        })
        .unwrap();
        let set = builder.compute(&data).unwrap();
        let chop = set.get(CHOP).unwrap();

        assert!(set.ready[25]);
        // Window 32..=45 is flat: choppiness undefined, carried forward from 42
        assert_eq!(chop[45], chop[42]);
        assert!(!set.ready[45]);
    }

    #[test]
    fn test_rejects_unordered_candles() {
        let builder = FeatureBuilder::new(small_config()).unwrap();
        let mut data = candles(40);
        data.swap(5, 30);
        assert!(matches!(
            builder.compute(&data),
            Err(SeriesError::OutOfOrder { .. })
        ));
        assert_eq!(builder.compute(&[]), Err(SeriesError::Empty));
    }

    #[test]
    fn test_rejects_bad_config() {
        let bad = FeatureConfig {
            kama_fast: 40,
            ..FeatureConfig::default()
        };
        assert!(FeatureBuilder::new(bad).is_err());
        let zero = FeatureConfig {
            fear_period: 0,
            ..FeatureConfig::default()
        };
        assert!(FeatureBuilder::new(zero).is_err());
    }
}
