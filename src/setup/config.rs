//! Setup state machine and trend gate configuration

use serde::{Deserialize, Serialize};

use crate::error::{require_non_negative, require_period, SeriesError, SeriesResult};

/// Band pullback setup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Long-term trend EMA period
    pub trend_period: usize,
    /// Bollinger band period
    pub band_period: usize,
    /// Bollinger band width in standard deviations
    pub band_std: f64,
    /// Money flow index period
    pub flow_period: usize,
    /// Long entries need MFI below this
    pub flow_long_max: f64,
    /// Short entries need MFI above this
    pub flow_short_min: f64,
    /// ATR period for the stop ratchet's market context
    pub atr_period: usize,
}

impl Default for SetupConfig {
    fn default() -> Self {
        SetupConfig {
            trend_period: 500,
            band_period: 50,
            band_std: 2.0,
            flow_period: 14,
            flow_long_max: 40.0,
            flow_short_min: 60.0,
            atr_period: 14,
        }
    }
}

impl SetupConfig {
    pub fn validate(&self) -> SeriesResult<()> {
        require_period("trend_period", self.trend_period)?;
        require_period("band_period", self.band_period)?;
        require_period("flow_period", self.flow_period)?;
        require_period("atr_period", self.atr_period)?;
        require_non_negative("band_std", self.band_std)?;
        for (name, value) in [
            ("flow_long_max", self.flow_long_max),
            ("flow_short_min", self.flow_short_min),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(SeriesError::invalid(name, format!("{} is outside 0..=100", value)));
            }
        }
        Ok(())
    }
}

/// Trend-following entry gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub ema_period: usize,
    pub rsi_period: usize,
    pub adx_period: usize,
    /// Minimum ADX for either side
    pub adx_min: f64,
    /// Longs need RSI above this
    pub rsi_long_min: f64,
    /// Shorts need RSI inside (rsi_short_min, rsi_short_max)
    pub rsi_short_min: f64,
    pub rsi_short_max: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        TrendConfig {
            ema_period: 100,
            rsi_period: 14,
            adx_period: 14,
            adx_min: 15.0,
            rsi_long_min: 50.0,
            rsi_short_min: 25.0,
            rsi_short_max: 50.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl TrendConfig {
    pub fn validate(&self) -> SeriesResult<()> {
        require_period("ema_period", self.ema_period)?;
        require_period("rsi_period", self.rsi_period)?;
        require_period("adx_period", self.adx_period)?;
        require_period("macd_fast", self.macd_fast)?;
        require_period("macd_slow", self.macd_slow)?;
        require_period("macd_signal", self.macd_signal)?;
        require_non_negative("adx_min", self.adx_min)?;
        if self.macd_fast >= self.macd_slow {
            return Err(SeriesError::invalid(
                "macd_fast",
                format!("{} must be shorter than macd_slow {}", self.macd_fast, self.macd_slow),
            ));
        }
        if self.rsi_short_min >= self.rsi_short_max {
            return Err(SeriesError::invalid(
                "rsi_short_min",
                "must be below rsi_short_max",
            ));
        }
        Ok(())
    }
}
