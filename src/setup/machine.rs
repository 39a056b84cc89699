//! Band pullback state machine evaluated over a candle sequence

use tracing::debug;

use super::config::SetupConfig;
use super::{
    crossed_above, crossed_below, scan_setup, ENTER_LONG, ENTER_SHORT, LONG_TRIGGER,
    POTENTIAL_LONG, POTENTIAL_SHORT, SHORT_TRIGGER,
};
use crate::data::validate_sequence;
use crate::error::{SeriesError, SeriesResult};
use crate::frame::{CandleFrame, Column};
use crate::indicators::{atr, bollinger_bands, ema, mfi};
use crate::ratchet::MarketContext;
use crate::{Candle, EntryDecision, RegimeReading, SetupState, Side};

/// Indicator columns the machine reads
#[derive(Debug, Clone, PartialEq)]
pub struct SetupIndicators {
    pub trend: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
    pub flow: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
}

impl SetupIndicators {
    /// Close, middle band and ATR of candle `i`, for the stop ratchet
    pub fn market_context(&self, candles: &[Candle], i: usize) -> Option<MarketContext> {
        let candle = candles.get(i)?;
        Some(MarketContext {
            close: candle.close,
            band_middle: self.middle.get(i).copied().flatten(),
            atr: self.atr.get(i).copied().flatten(),
        })
    }
}

/// Per-candle output of the machine
#[derive(Debug, Clone, PartialEq)]
pub struct SetupSignals {
    pub potential_long: Vec<bool>,
    pub potential_short: Vec<bool>,
    pub long_trigger: Vec<bool>,
    pub short_trigger: Vec<bool>,
    pub enter_long: Vec<bool>,
    pub enter_short: Vec<bool>,
    /// Merged state, long first
    pub states: Vec<SetupState>,
    /// Merged decision, long first
    pub entries: Vec<EntryDecision>,
}

impl SetupSignals {
    pub fn entry_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| **e != EntryDecision::None)
            .count()
    }

    pub fn last_state(&self) -> SetupState {
        self.states.last().copied().unwrap_or_default()
    }

    /// Write the per-candle flags as frame columns
    pub fn write_columns(&self, frame: &mut CandleFrame) -> SeriesResult<()> {
        for (name, values) in [
            (POTENTIAL_LONG, &self.potential_long),
            (POTENTIAL_SHORT, &self.potential_short),
            (LONG_TRIGGER, &self.long_trigger),
            (SHORT_TRIGGER, &self.short_trigger),
            (ENTER_LONG, &self.enter_long),
            (ENTER_SHORT, &self.enter_short),
        ] {
            frame.insert_column(name, Column::Flag(values.clone()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SetupMachine {
    config: SetupConfig,
}

impl SetupMachine {
    pub fn new(config: SetupConfig) -> SeriesResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    pub fn indicators(&self, candles: &[Candle]) -> SetupIndicators {
        let cfg = &self.config;
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let (upper, middle, lower) = bollinger_bands(&close, cfg.band_period, cfg.band_std);

        SetupIndicators {
            trend: ema(&close, cfg.trend_period),
            upper,
            middle,
            lower,
            flow: mfi(candles, cfg.flow_period),
            atr: atr(&high, &low, &close, cfg.atr_period),
        }
    }

    /// Compute indicators and run the machine.
    ///
    /// `readings` must hold one regime reading per candle.
    pub fn evaluate(&self, candles: &[Candle], readings: &[RegimeReading]) -> SeriesResult<SetupSignals> {
        let indicators = self.indicators(candles);
        self.evaluate_with(candles, &indicators, readings)
    }

    /// Run the machine over precomputed indicator columns
    pub fn evaluate_with(
        &self,
        candles: &[Candle],
        ind: &SetupIndicators,
        readings: &[RegimeReading],
    ) -> SeriesResult<SetupSignals> {
        validate_sequence(candles)?;
        let n = candles.len();
        for (name, len) in [
            ("regime_readings", readings.len()),
            ("trend", ind.trend.len()),
            ("upper", ind.upper.len()),
            ("lower", ind.lower.len()),
            ("flow", ind.flow.len()),
        ] {
            if len != n {
                return Err(SeriesError::LengthMismatch {
                    name: name.to_string(),
                    expected: n,
                    found: len,
                });
            }
        }

        let mut long_entry = Vec::with_capacity(n);
        let mut long_invalid = Vec::with_capacity(n);
        let mut short_entry = Vec::with_capacity(n);
        let mut short_invalid = Vec::with_capacity(n);

        for (i, c) in candles.iter().enumerate() {
            match (ind.trend[i], ind.lower[i]) {
                (Some(trend), Some(lower)) => {
                    long_entry.push(
                        lower > trend
                            && c.low > trend
                            && c.close < lower
                            && readings[i].allows(Side::Long),
                    );
                    long_invalid.push(lower < trend || c.low < trend);
                }
                _ => {
                    long_entry.push(false);
                    long_invalid.push(true);
                }
            }

            match (ind.trend[i], ind.upper[i]) {
                (Some(trend), Some(upper)) => {
                    short_entry.push(
                        upper < trend
                            && c.high < trend
                            && c.close > upper
                            && readings[i].allows(Side::Short),
                    );
                    short_invalid.push(upper > trend || c.high > trend);
                }
                _ => {
                    short_entry.push(false);
                    short_invalid.push(true);
                }
            }
        }

        let potential_long = scan_setup(&long_entry, &long_invalid);
        let potential_short = scan_setup(&short_entry, &short_invalid);

        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let long_trigger = crossed_above(&highs, &ind.lower);
        let short_trigger = crossed_below(&lows, &ind.upper);

        let enter_long: Vec<bool> = (0..n)
            .map(|i| {
                potential_long[i]
                    && long_trigger[i]
                    && ind.flow[i].is_some_and(|f| f < self.config.flow_long_max)
            })
            .collect();
        let enter_short: Vec<bool> = (0..n)
            .map(|i| {
                potential_short[i]
                    && short_trigger[i]
                    && ind.flow[i].is_some_and(|f| f > self.config.flow_short_min)
            })
            .collect();

        let states = (0..n)
            .map(|i| {
                if potential_long[i] {
                    SetupState::PotentialLong
                } else if potential_short[i] {
                    SetupState::PotentialShort
                } else {
                    SetupState::None
                }
            })
            .collect();

        let entries = (0..n)
            .map(|i| {
                if enter_long[i] {
                    EntryDecision::Long
                } else if enter_short[i] {
                    EntryDecision::Short
                } else {
                    EntryDecision::None
                }
            })
            .collect();

        Ok(SetupSignals {
            potential_long,
            potential_short,
            long_trigger,
            short_trigger,
            enter_long,
            enter_short,
            states,
            entries,
        })
    }

    /// Evaluate and write the signal columns into `frame`
    pub fn populate(&self, frame: &mut CandleFrame, readings: &[RegimeReading]) -> SeriesResult<SetupSignals> {
        let signals = self.evaluate(frame.candles(), readings)?;

        debug!(
            "{} {}: {} entries, last state {:?}",
            frame.pair(),
            frame.timeframe(),
            signals.entry_count(),
            signals.last_state()
        );

        signals.write_columns(frame)?;
        Ok(signals)
    }
}
