//! Core data types used across the regime pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error, PartialEq)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("{field} is not a finite number ({value})")]
    NonFinite { field: &'static str, value: f64 },
}

/// OHLCV candlestick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self::new_unchecked(datetime, open, high, low, close, volume);
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (for trusted sources or when validation is done separately)
    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(CandleValidationError::NonFinite { field, value });
            }
        }

        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    /// Check if the candle is valid without returning detailed error
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

// Lets `ta` indicators consume candles directly via `Next<&Candle>`.
impl ta::Open for Candle {
    fn open(&self) -> f64 {
        self.open
    }
}

impl ta::High for Candle {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for Candle {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Trading pair symbol using Arc<str> for cheap cloning
///
/// Pairs are cloned into every frame, report and relay message, so the
/// symbol is reference counted instead of reallocated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system friendly form ("BTC/USDT:USDT" -> "BTC_USDT_USDT")
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

// =============================================================================
// Regime classification
// =============================================================================

/// Coarse market direction over a forward horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    Bear,
    Neutral,
    Bull,
}

impl Regime {
    pub const ALL: [Regime; 3] = [Regime::Bear, Regime::Neutral, Regime::Bull];

    /// Numeric class index used by classifier targets (BEAR=0, NEUTRAL=1, BULL=2)
    pub fn class_index(self) -> u8 {
        match self {
            Regime::Bear => 0,
            Regime::Neutral => 1,
            Regime::Bull => 2,
        }
    }

    pub fn from_class_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Regime::Bear),
            1 => Some(Regime::Neutral),
            2 => Some(Regime::Bull),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Regime::Bear => "BEAR",
            Regime::Neutral => "NEUTRAL",
            Regime::Bull => "BULL",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Regime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BEAR" | "0" => Ok(Regime::Bear),
            "NEUTRAL" | "1" => Ok(Regime::Neutral),
            "BULL" | "2" => Ok(Regime::Bull),
            other => Err(format!("Unknown regime: {}", other)),
        }
    }
}

/// Per-class probabilities reported by a regime classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeConfidence {
    #[serde(rename = "BEAR")]
    pub bear: f64,
    #[serde(rename = "NEUTRAL")]
    pub neutral: f64,
    #[serde(rename = "BULL")]
    pub bull: f64,
}

impl RegimeConfidence {
    pub fn new(bear: f64, neutral: f64, bull: f64) -> Self {
        Self {
            bear,
            neutral,
            bull,
        }
    }

    /// Full confidence in a single class
    pub fn certain(regime: Regime) -> Self {
        match regime {
            Regime::Bear => Self::new(1.0, 0.0, 0.0),
            Regime::Neutral => Self::new(0.0, 1.0, 0.0),
            Regime::Bull => Self::new(0.0, 0.0, 1.0),
        }
    }

    pub fn get(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Bear => self.bear,
            Regime::Neutral => self.neutral,
            Regime::Bull => self.bull,
        }
    }

    /// Most probable class; ties resolve toward NEUTRAL, then BEAR.
    /// Returns None when any probability is not finite.
    pub fn most_likely(&self) -> Option<Regime> {
        if !(self.bear.is_finite() && self.neutral.is_finite() && self.bull.is_finite()) {
            return None;
        }
        let mut best = Regime::Neutral;
        for regime in [Regime::Bear, Regime::Bull] {
            if self.get(regime) > self.get(best) {
                best = regime;
            }
        }
        Some(best)
    }

    /// Highest class probability
    pub fn max(&self) -> f64 {
        self.bear.max(self.neutral).max(self.bull)
    }
}

/// What is known about the regime at a given candle.
///
/// Keeps "model not trained yet" apart from "model said NEUTRAL".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RegimeReading {
    Available {
        regime: Regime,
        confidence: RegimeConfidence,
    },
    /// A classifier exists but has not produced a prediction yet (training)
    Pending,
    /// No classifier output covers this candle
    #[default]
    Unavailable,
}

impl RegimeReading {
    pub fn available(regime: Regime, confidence: RegimeConfidence) -> Self {
        RegimeReading::Available { regime, confidence }
    }

    /// Reading derived from probabilities; non-finite probabilities mean Pending
    pub fn from_confidence(confidence: RegimeConfidence) -> Self {
        match confidence.most_likely() {
            Some(regime) => RegimeReading::Available { regime, confidence },
            None => RegimeReading::Pending,
        }
    }

    pub fn regime(&self) -> Option<Regime> {
        match self {
            RegimeReading::Available { regime, .. } => Some(*regime),
            _ => None,
        }
    }

    /// Whether a setup on `side` is compatible with this reading.
    ///
    /// Only an explicit contradiction blocks: BEAR blocks longs, BULL blocks
    /// shorts. Pending and Unavailable readings never block.
    pub fn allows(&self, side: Side) -> bool {
        !matches!(
            (self.regime(), side),
            (Some(Regime::Bear), Side::Long) | (Some(Regime::Bull), Side::Short)
        )
    }

    /// Label used on the wire and in logs
    pub fn label(&self) -> &'static str {
        match self {
            RegimeReading::Available { regime, .. } => regime.as_str(),
            RegimeReading::Pending => "TRAINING",
            RegimeReading::Unavailable => "UNAVAILABLE",
        }
    }
}

// =============================================================================
// Setup / entry state
// =============================================================================

/// Merged per-candle setup state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SetupState {
    #[default]
    None,
    PotentialLong,
    PotentialShort,
}

/// Per-candle entry decision handed to the execution host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntryDecision {
    #[default]
    None,
    Long,
    Short,
}

impl EntryDecision {
    pub fn side(self) -> Option<Side> {
        match self {
            EntryDecision::None => None,
            EntryDecision::Long => Some(Side::Long),
            EntryDecision::Short => Some(Side::Short),
        }
    }
}

/// Read-only view of an open trade, owned by the execution host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSnapshot {
    pub pair: Symbol,
    pub side: Side,
    pub open_rate: f64,
    pub current_rate: f64,
    /// Profit as a fraction of the open rate (0.05 = 5%)
    pub current_profit: f64,
    pub opened_at: DateTime<Utc>,
}

impl TradeSnapshot {
    /// Profit fraction implied by the current rate
    pub fn profit_at(side: Side, open_rate: f64, current_rate: f64) -> f64 {
        if open_rate <= 0.0 {
            return 0.0;
        }
        match side {
            Side::Long => (current_rate - open_rate) / open_rate,
            Side::Short => (open_rate - current_rate) / open_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_validation() {
        let now = Utc::now();
        assert!(Candle::new(now, 100.0, 105.0, 95.0, 102.0, 10.0).is_ok());
        assert_eq!(
            Candle::new(now, 100.0, 95.0, 105.0, 100.0, 10.0),
            Err(CandleValidationError::HighLessThanLow {
                high: 95.0,
                low: 105.0
            })
        );
        assert!(matches!(
            Candle::new(now, 100.0, 105.0, 95.0, 110.0, 10.0),
            Err(CandleValidationError::CloseOutOfRange { .. })
        ));
        assert!(matches!(
            Candle::new(now, 100.0, 105.0, 95.0, 100.0, -1.0),
            Err(CandleValidationError::NegativeVolume(_))
        ));
    }

    #[test]
    fn test_non_finite_fields_rejected() {
        let now = Utc::now();
        assert!(matches!(
            Candle::new(now, 100.0, 105.0, 95.0, f64::NAN, 10.0),
            Err(CandleValidationError::NonFinite { field: "close", .. })
        ));
        assert!(matches!(
            Candle::new(now, 100.0, f64::INFINITY, 95.0, 100.0, 10.0),
            Err(CandleValidationError::NonFinite { field: "high", .. })
        ));
        assert!(matches!(
            Candle::new(now, 100.0, 105.0, 95.0, 100.0, f64::NAN),
            Err(CandleValidationError::NonFinite { field: "volume", .. })
        ));
        assert!(!Candle::new_unchecked(now, f64::NAN, 105.0, 95.0, 100.0, 10.0).is_valid());
    }

    #[test]
    fn test_regime_class_index_roundtrip() {
        for regime in Regime::ALL {
            assert_eq!(Regime::from_class_index(regime.class_index()), Some(regime));
        }
        assert_eq!(Regime::from_class_index(7), None);
        assert_eq!("bull".parse::<Regime>(), Ok(Regime::Bull));
        assert_eq!("0".parse::<Regime>(), Ok(Regime::Bear));
        assert!("SIDEWAYS".parse::<Regime>().is_err());
    }

    #[test]
    fn test_confidence_most_likely() {
        let conf = RegimeConfidence::new(0.0149, 0.0, 0.9851);
        assert_eq!(conf.most_likely(), Some(Regime::Bull));
        assert_eq!(
            RegimeConfidence::new(0.4, 0.4, 0.2).most_likely(),
            Some(Regime::Neutral)
        );
        assert_eq!(RegimeConfidence::new(f64::NAN, 0.5, 0.5).most_likely(), None);
    }

    #[test]
    fn test_reading_gate() {
        let bear = RegimeReading::available(Regime::Bear, RegimeConfidence::certain(Regime::Bear));
        let bull = RegimeReading::available(Regime::Bull, RegimeConfidence::certain(Regime::Bull));
        let neutral = RegimeReading::available(
            Regime::Neutral,
            RegimeConfidence::certain(Regime::Neutral),
        );

        assert!(!bear.allows(Side::Long));
        assert!(bear.allows(Side::Short));
        assert!(bull.allows(Side::Long));
        assert!(!bull.allows(Side::Short));
        assert!(neutral.allows(Side::Long) && neutral.allows(Side::Short));
        assert!(RegimeReading::Pending.allows(Side::Long));
        assert!(RegimeReading::Unavailable.allows(Side::Short));
    }

    #[test]
    fn test_pending_is_not_neutral() {
        let neutral = RegimeReading::from_confidence(RegimeConfidence::certain(Regime::Neutral));
        assert_eq!(neutral.regime(), Some(Regime::Neutral));
        assert_eq!(RegimeReading::Pending.regime(), None);
        assert_ne!(neutral.label(), RegimeReading::Pending.label());
    }

    #[test]
    fn test_symbol_file_stem() {
        assert_eq!(Symbol::new("BTC/USDT:USDT").file_stem(), "BTC_USDT_USDT");
        assert_eq!(Symbol::new("BTCUSDT").file_stem(), "BTCUSDT");
    }

    #[test]
    fn test_profit_at() {
        assert!((TradeSnapshot::profit_at(Side::Long, 100.0, 105.0) - 0.05).abs() < 1e-12);
        assert!((TradeSnapshot::profit_at(Side::Short, 100.0, 95.0) - 0.05).abs() < 1e-12);
        assert_eq!(TradeSnapshot::profit_at(Side::Long, 0.0, 95.0), 0.0);
    }
}
