//! Multi-Timeframe Data Management
//!
//! Stores candles for several timeframes of one pair and carries readings
//! computed on a coarse timeframe (the regime timeframe) onto a finer entry
//! timeframe without looking ahead.

use crate::{Candle, RegimeReading, Symbol};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Multi-timeframe candle data for a single pair
#[derive(Debug, Clone)]
pub struct MultiTimeframeData {
    /// Key: timeframe string (e.g., "4h", "15m")
    timeframes: HashMap<String, Vec<Candle>>,

    /// Timeframe entries are evaluated on
    primary_timeframe: String,
}

impl MultiTimeframeData {
    pub fn new(primary_timeframe: impl Into<String>) -> Self {
        Self {
            timeframes: HashMap::new(),
            primary_timeframe: primary_timeframe.into(),
        }
    }

    /// Add candle data for a specific timeframe
    pub fn add_timeframe(&mut self, timeframe: impl Into<String>, candles: Vec<Candle>) {
        self.timeframes.insert(timeframe.into(), candles);
    }

    /// Get candles for a specific timeframe
    pub fn get(&self, timeframe: &str) -> Option<&[Candle]> {
        self.timeframes.get(timeframe).map(|v| v.as_slice())
    }

    /// Get the primary timeframe candles
    pub fn primary(&self) -> &[Candle] {
        self.get(&self.primary_timeframe).unwrap_or(&[])
    }

    pub fn primary_timeframe(&self) -> &str {
        &self.primary_timeframe
    }

    /// Available timeframes, sorted
    pub fn timeframes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.timeframes.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn has_timeframe(&self, timeframe: &str) -> bool {
        self.timeframes.contains_key(timeframe)
    }

    /// Get the length of the primary timeframe data
    pub fn len(&self) -> usize {
        self.primary().len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_empty()
    }
}

/// Container for multi-pair multi-timeframe data
pub type MultiSymbolMultiTimeframeData = HashMap<Symbol, MultiTimeframeData>;

/// Align coarse-timeframe readings to fine-timeframe candles.
///
/// `coarse` holds readings keyed by the open time of their coarse candle. A
/// reading becomes visible on the first fine candle whose close is at or after
/// the coarse candle's close, so a fine candle only ever sees regimes of coarse
/// candles that had fully closed by the time it closed. Fine candles before the
/// first visible reading get `RegimeReading::Unavailable`.
pub fn project_readings(
    coarse: &[(DateTime<Utc>, RegimeReading)],
    coarse_duration: Duration,
    fine: &[Candle],
    fine_duration: Duration,
) -> Vec<RegimeReading> {
    let mut projected = Vec::with_capacity(fine.len());
    let mut current = RegimeReading::Unavailable;
    let mut next = 0;

    for candle in fine {
        let fine_close = candle.datetime + fine_duration;
        while next < coarse.len() && coarse[next].0 + coarse_duration <= fine_close {
            current = coarse[next].1;
            next += 1;
        }
        projected.push(current);
    }

    projected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Regime, RegimeConfidence};
    use chrono::TimeZone;

    fn fine_candles(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                Candle::new(
                    start + Duration::hours(i as i64),
                    100.0,
                    110.0,
                    90.0,
                    105.0,
                    1000.0,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_multi_timeframe_data() {
        let mut mtf = MultiTimeframeData::new("1h");
        mtf.add_timeframe("1h", fine_candles(3));
        mtf.add_timeframe("4h", fine_candles(1));

        assert_eq!(mtf.len(), 3);
        assert!(mtf.has_timeframe("4h"));
        assert!(!mtf.has_timeframe("1d"));
        assert_eq!(mtf.timeframes(), vec!["1h", "4h"]);
    }

    #[test]
    fn test_missing_primary_is_empty() {
        let mut mtf = MultiTimeframeData::new("15m");
        mtf.add_timeframe("4h", fine_candles(2));
        assert!(mtf.is_empty());
    }

    #[test]
    fn test_projection_waits_for_coarse_close() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bull = RegimeReading::available(Regime::Bull, RegimeConfidence::certain(Regime::Bull));
        let bear = RegimeReading::available(Regime::Bear, RegimeConfidence::certain(Regime::Bear));
        let coarse = vec![(start, bull), (start + Duration::hours(4), bear)];

        let projected = project_readings(&coarse, Duration::hours(4), &fine_candles(9), Duration::hours(1));

        // 00:00-03:00 fine candles: the first 4h candle closes with the 03:00 candle
        assert_eq!(projected[0], RegimeReading::Unavailable);
        assert_eq!(projected[2], RegimeReading::Unavailable);
        assert_eq!(projected[3], bull);
        assert_eq!(projected[6], bull);
        assert_eq!(projected[7], bear);
        assert_eq!(projected[8], bear);
    }
}
