//! Trend-following entry gate
//!
//! Entries that follow the classifier instead of fading the bands: a BULL
//! reading plus a healthy uptrend (price above EMA, RSI and MACD confirming,
//! ADX showing a real trend) enters long, and the BEAR mirror enters short.

use super::config::TrendConfig;
use crate::data::validate_sequence;
use crate::error::{SeriesError, SeriesResult};
use crate::indicators::{adx, ema, macd, rsi};
use crate::{Candle, EntryDecision, Regime, RegimeReading};

#[derive(Debug, Clone)]
pub struct TrendGate {
    config: TrendConfig,
}

impl TrendGate {
    pub fn new(config: TrendConfig) -> SeriesResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// One decision per candle; long wins if both sides qualify
    pub fn evaluate(&self, candles: &[Candle], readings: &[RegimeReading]) -> SeriesResult<Vec<EntryDecision>> {
        validate_sequence(candles)?;
        if readings.len() != candles.len() {
            return Err(SeriesError::LengthMismatch {
                name: "regime_readings".to_string(),
                expected: candles.len(),
                found: readings.len(),
            });
        }

        let cfg = &self.config;
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let trend = ema(&close, cfg.ema_period);
        let momentum = rsi(&close, cfg.rsi_period);
        let (macd_line, signal_line, _) = macd(&close, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let strength = adx(&high, &low, &close, cfg.adx_period);

        let decisions = (0..candles.len())
            .map(|i| {
                let (Some(ema_v), Some(rsi_v), Some(macd_v), Some(signal_v), Some(adx_v)) =
                    (trend[i], momentum[i], macd_line[i], signal_line[i], strength[i])
                else {
                    return EntryDecision::None;
                };

                if adx_v <= cfg.adx_min {
                    return EntryDecision::None;
                }

                match readings[i].regime() {
                    Some(Regime::Bull)
                        if close[i] > ema_v && rsi_v > cfg.rsi_long_min && macd_v > signal_v =>
                    {
                        EntryDecision::Long
                    }
                    Some(Regime::Bear)
                        if close[i] < ema_v
                            && rsi_v > cfg.rsi_short_min
                            && rsi_v < cfg.rsi_short_max
                            && macd_v < signal_v =>
                    {
                        EntryDecision::Short
                    }
                    _ => EntryDecision::None,
                }
            })
            .collect();

        Ok(decisions)
    }
}
