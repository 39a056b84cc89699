//! Forward-looking regime labeler
//!
//! Assigns each candle a BEAR / NEUTRAL / BULL training target by comparing
//! the extremes of the next `horizon` candles against an ATR-scaled barrier
//! around the candle's close. Labels use future data on purpose: they are
//! training targets only and must never feed a live decision.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::validate_sequence;
use crate::error::{require_non_negative, require_period, SeriesError, SeriesResult};
use crate::frame::{CandleFrame, Column};
use crate::indicators::{atr, rolling_max, rolling_min};
use crate::{Candle, Regime};

pub const REGIME_LABEL: &str = "regime_label";
pub const LABEL_MEASURED: &str = "label_measured";

/// Which label wins when both barriers are crossed inside one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    BullOverridesBear,
    BearOverridesBull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Forward window length in candles
    pub horizon: usize,
    pub atr_period: usize,
    /// Barrier = ATR * multiple
    pub atr_multiple: f64,
    pub tie_break: TieBreak,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            horizon: 24,
            atr_period: 14,
            atr_multiple: 2.0,
            tie_break: TieBreak::default(),
        }
    }
}

impl LabelConfig {
    pub fn validate(&self) -> SeriesResult<()> {
        require_period("horizon", self.horizon)?;
        require_period("atr_period", self.atr_period)?;
        require_non_negative("atr_multiple", self.atr_multiple)
    }
}

/// Why a label has the value it has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelBasis {
    /// Full forward window and a defined barrier
    Measured,
    /// Barrier undefined (ATR still warming up); NEUTRAL by convention
    Warmup,
    /// Fewer than `horizon` candles remain; NEUTRAL by convention
    Truncated,
}

/// Labels plus the basis of each one, aligned with the input candles
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeLabels {
    pub regimes: Vec<Regime>,
    pub basis: Vec<LabelBasis>,
}

impl RegimeLabels {
    pub fn len(&self) -> usize {
        self.regimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regimes.is_empty()
    }

    /// Numeric training targets (BEAR=0, NEUTRAL=1, BULL=2)
    pub fn class_indices(&self) -> Vec<u8> {
        self.regimes.iter().map(|r| r.class_index()).collect()
    }

    pub fn summary(&self) -> LabelSummary {
        let mut summary = LabelSummary::default();
        for (regime, basis) in self.regimes.iter().zip(&self.basis) {
            match regime {
                Regime::Bear => summary.bear += 1,
                Regime::Neutral => summary.neutral += 1,
                Regime::Bull => summary.bull += 1,
            }
            match basis {
                LabelBasis::Measured => summary.measured += 1,
                LabelBasis::Warmup => summary.warmup += 1,
                LabelBasis::Truncated => summary.truncated += 1,
            }
        }
        summary
    }
}

/// Label distribution of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSummary {
    pub bear: usize,
    pub neutral: usize,
    pub bull: usize,
    pub measured: usize,
    pub warmup: usize,
    pub truncated: usize,
}

impl LabelSummary {
    pub fn total(&self) -> usize {
        self.bear + self.neutral + self.bull
    }

    /// Share of a class among all labels, in percent
    pub fn share(&self, regime: Regime) -> f64 {
        let count = match regime {
            Regime::Bear => self.bear,
            Regime::Neutral => self.neutral,
            Regime::Bull => self.bull,
        };
        if self.total() == 0 {
            0.0
        } else {
            count as f64 / self.total() as f64 * 100.0
        }
    }
}

/// Label candles against an explicit per-candle barrier.
///
/// Candle `i` looks at `[i + 1, i + horizon]` only. BULL when the window's
/// highest high exceeds `close + barrier`, BEAR when its lowest low falls
/// below `close - barrier`; `tie_break` decides when both happen.
pub fn label_with_barriers(
    candles: &[Candle],
    barriers: &[Option<f64>],
    horizon: usize,
    tie_break: TieBreak,
) -> SeriesResult<RegimeLabels> {
    require_period("horizon", horizon)?;
    validate_sequence(candles)?;
    if barriers.len() != candles.len() {
        return Err(SeriesError::LengthMismatch {
            name: "barriers".to_string(),
            expected: candles.len(),
            found: barriers.len(),
        });
    }

    let n = candles.len();
    let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let low: Vec<f64> = candles.iter().map(|c| c.low).collect();

    // Trailing window ending at i + horizon == forward window starting at i + 1
    let trailing_max = rolling_max(&high, horizon);
    let trailing_min = rolling_min(&low, horizon);

    let mut regimes = Vec::with_capacity(n);
    let mut basis = Vec::with_capacity(n);

    for i in 0..n {
        let end = i + horizon;
        if end >= n {
            regimes.push(Regime::Neutral);
            basis.push(LabelBasis::Truncated);
            continue;
        }

        let (barrier, future_max, future_min) = match (barriers[i], trailing_max[end], trailing_min[end]) {
            (Some(b), Some(hi), Some(lo)) if b.is_finite() => (b, hi, lo),
            _ => {
                regimes.push(Regime::Neutral);
                basis.push(LabelBasis::Warmup);
                continue;
            }
        };

        let close = candles[i].close;
        let bull = future_max > close + barrier;
        let bear = future_min < close - barrier;

        let regime = match (bull, bear, tie_break) {
            (true, true, TieBreak::BullOverridesBear) => Regime::Bull,
            (true, true, TieBreak::BearOverridesBull) => Regime::Bear,
            (true, false, _) => Regime::Bull,
            (false, true, _) => Regime::Bear,
            (false, false, _) => Regime::Neutral,
        };
        regimes.push(regime);
        basis.push(LabelBasis::Measured);
    }

    Ok(RegimeLabels { regimes, basis })
}

#[derive(Debug, Clone)]
pub struct Labeler {
    config: LabelConfig,
}

impl Labeler {
    pub fn new(config: LabelConfig) -> SeriesResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    /// ATR-scaled barrier for every candle (None during ATR warm-up)
    pub fn barriers(&self, candles: &[Candle]) -> Vec<Option<f64>> {
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();

        atr(&high, &low, &close, self.config.atr_period)
            .into_iter()
            .map(|a| a.map(|a| a * self.config.atr_multiple))
            .collect()
    }

    pub fn label(&self, candles: &[Candle]) -> SeriesResult<RegimeLabels> {
        let barriers = self.barriers(candles);
        label_with_barriers(candles, &barriers, self.config.horizon, self.config.tie_break)
    }

    /// Write `regime_label` and `label_measured` columns into `frame`
    pub fn populate(&self, frame: &mut CandleFrame) -> SeriesResult<LabelSummary> {
        let labels = self.label(frame.candles())?;
        let summary = labels.summary();

        debug!(
            "{} {}: labels bear={} neutral={} bull={} (measured={} warmup={} truncated={})",
            frame.pair(),
            frame.timeframe(),
            summary.bear,
            summary.neutral,
            summary.bull,
            summary.measured,
            summary.warmup,
            summary.truncated
        );

        let measured = labels
            .basis
            .iter()
            .map(|b| *b == LabelBasis::Measured)
            .collect();
        frame.insert_column(REGIME_LABEL, Column::Regime(labels.regimes))?;
        frame.insert_column(LABEL_MEASURED, Column::Flag(measured))?;

        Ok(summary)
    }
}
