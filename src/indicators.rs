//! Technical indicators powered by the `ta` crate
//!
//! Slice-in, `Vec<Option<f64>>`-out wrappers. `None` marks candles inside an
//! indicator's warm-up window (or an undefined value); every output has the
//! same length as its input so columns stay aligned by position.
//!
//! Available indicators:
//! - Moving Averages: SMA, EMA, KAMA
//! - Momentum: RSI, MACD, ADX
//! - Volatility: True Range, ATR, Bollinger Bands, Choppiness
//! - Volume: OBV, MFI
//! - Helpers: rolling max/min, percent change, forward fill, NaN-safe ratio

use std::collections::VecDeque;
use ta::indicators::{
    BollingerBands as TaBB, ExponentialMovingAverage, MoneyFlowIndex as TaMFI,
    MovingAverageConvergenceDivergence, OnBalanceVolume, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use ta::Next;

use crate::Candle;

// =============================================================================
// Type Aliases for Complex Return Types
// =============================================================================

/// Type alias for band indicators (upper, middle, lower)
pub type BandOutput = (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>);

// =============================================================================
// Series Helpers
// =============================================================================

/// Ratio that refuses to divide by zero, NaN or infinity
pub fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return None;
    }
    let ratio = numerator / denominator;
    ratio.is_finite().then_some(ratio)
}

/// Carry the last defined value forward over gaps.
///
/// Leading `None`s stay `None`: there is nothing to carry yet.
pub fn forward_fill(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut last = None;
    values
        .iter()
        .map(|v| {
            if let Some(x) = v.filter(|x| x.is_finite()) {
                last = Some(x);
            }
            last
        })
        .collect()
}

/// Percent change versus the previous value
pub fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i == 0 {
            result.push(None);
        } else {
            result.push(safe_ratio(values[i] - values[i - 1], values[i - 1]));
        }
    }
    result
}

/// Sliding window extreme using a monotonic deque (O(n))
fn rolling_extreme(values: &[f64], period: usize, keeps: fn(f64, f64) -> bool) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    let mut window: VecDeque<usize> = VecDeque::with_capacity(period);
    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        while let Some(&back) = window.back() {
            if keeps(values[back], value) {
                break;
            }
            window.pop_back();
        }
        window.push_back(i);

        while let Some(&front) = window.front() {
            if front + period <= i {
                window.pop_front();
            } else {
                break;
            }
        }

        if i + 1 >= period {
            result.push(window.front().map(|&idx| values[idx]));
        } else {
            result.push(None);
        }
    }

    result
}

/// Highest value over a trailing window of `period` values
pub fn rolling_max(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_extreme(values, period, |kept, new| kept > new)
}

/// Lowest value over a trailing window of `period` values
pub fn rolling_min(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_extreme(values, period, |kept, new| kept < new)
}

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let sma_val = indicator.next(value);
        if i + 1 >= period {
            result.push(Some(sma_val));
        } else {
            result.push(None);
        }
    }

    result
}

/// Calculate Exponential Moving Average
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    let mut indicator = match ExponentialMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let ema_val = indicator.next(value);
        if i + 1 >= period {
            result.push(Some(ema_val));
        } else {
            result.push(None);
        }
    }

    result
}

/// Kaufman Adaptive Moving Average
///
/// The smoothing constant follows the efficiency ratio
/// `|close[i] - close[i - period]| / sum(|close[j] - close[j - 1]|)`:
/// efficient (trending) moves pull the average toward price quickly,
/// noisy moves barely move it. Seeded with the close at index `period - 1`.
pub fn kama(values: &[f64], period: usize, fast: usize, slow: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];
    if period == 0 || fast == 0 || slow == 0 || values.len() < period {
        return result;
    }

    let fast_sc = 2.0 / (fast as f64 + 1.0);
    let slow_sc = 2.0 / (slow as f64 + 1.0);

    let mut kama_value = values[period - 1];
    result[period - 1] = Some(kama_value);

    for i in period..values.len() {
        let direction = (values[i] - values[i - period]).abs();
        let volatility: f64 = values[i + 1 - period..=i]
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .sum::<f64>()
            + (values[i + 1 - period] - values[i - period]).abs();

        let efficiency = safe_ratio(direction, volatility).unwrap_or(0.0);
        let sc = (efficiency * (fast_sc - slow_sc) + slow_sc).powi(2);

        kama_value += sc * (values[i] - kama_value);
        result[i] = Some(kama_value);
    }

    result
}

// =============================================================================
// Volatility Indicators
// =============================================================================

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Apply Wilder's smoothing to a series
/// Wilder's smoothing: new_value = (prev_value * (period - 1) + current) / period
fn wilders_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    let mut result = Vec::with_capacity(values.len());
    let mut smoothed: Option<f64> = None;

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else if i + 1 == period {
            // First value is SMA
            let sum: f64 = values[0..period].iter().sum();
            smoothed = Some(sum / period as f64);
            result.push(smoothed);
        } else if let Some(prev) = smoothed {
            let new_val = (prev * (period - 1) as f64 + values[i]) / period as f64;
            smoothed = Some(new_val);
            result.push(smoothed);
        } else {
            result.push(None);
        }
    }

    result
}

/// Calculate Average True Range (ATR) using Wilder's smoothing
///
/// ATR = (prev_ATR * (period - 1) + current_TR) / period, seeded with the SMA
/// of the first `period` true ranges. The first `period - 1` values are `None`.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![None; high.len()];
    }

    let tr = true_range(high, low, close);
    wilders_smooth(&tr, period)
}

/// Calculate Bollinger Bands using ta crate
pub fn bollinger_bands(values: &[f64], period: usize, num_std: f64) -> BandOutput {
    if values.is_empty() || period == 0 {
        return (
            vec![None; values.len()],
            vec![None; values.len()],
            vec![None; values.len()],
        );
    }

    let mut indicator = match TaBB::new(period, num_std) {
        Ok(i) => i,
        Err(_) => {
            return (
                vec![None; values.len()],
                vec![None; values.len()],
                vec![None; values.len()],
            )
        }
    };

    let mut upper = Vec::with_capacity(values.len());
    let mut middle = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let bb = indicator.next(value);
        if i + 1 >= period {
            upper.push(Some(bb.upper));
            middle.push(Some(bb.average));
            lower.push(Some(bb.lower));
        } else {
            upper.push(None);
            middle.push(None);
            lower.push(None);
        }
    }

    (upper, middle, lower)
}

/// Choppiness Index
///
/// `100 * log10(sum(TR, n) / (highest_high(n) - lowest_low(n))) / log10(n)`.
/// High values mean sideways, low values mean trending. A flat window
/// (zero high-low range) is undefined.
pub fn choppiness(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if period < 2 || high.len() != low.len() || high.len() != close.len() {
        return vec![None; high.len()];
    }

    let tr = true_range(high, low, close);
    let highest = rolling_max(high, period);
    let lowest = rolling_min(low, period);
    let log_period = (period as f64).log10();

    let mut tr_sum = 0.0;
    let mut result = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        tr_sum += tr[i];
        if i >= period {
            tr_sum -= tr[i - period];
        }

        let value = match (highest[i], lowest[i]) {
            (Some(hh), Some(ll)) => {
                safe_ratio(tr_sum, hh - ll).and_then(|ratio| {
                    (ratio > 0.0).then(|| 100.0 * ratio.log10() / log_period)
                })
            }
            _ => None,
        };
        result.push(value);
    }

    result
}

// =============================================================================
// Momentum Indicators
// =============================================================================

/// Calculate RSI (Relative Strength Index) using ta crate
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    let mut indicator = match RelativeStrengthIndex::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let rsi_val = indicator.next(value);
        if i + 1 >= period {
            result.push(Some(rsi_val));
        } else {
            result.push(None);
        }
    }

    result
}

/// Calculate MACD using ta crate
/// Returns (macd line, signal line, histogram)
pub fn macd(
    values: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> BandOutput {
    let empty = || {
        (
            vec![None; values.len()],
            vec![None; values.len()],
            vec![None; values.len()],
        )
    };

    if values.is_empty() {
        return empty();
    }

    let mut indicator =
        match MovingAverageConvergenceDivergence::new(fast_period, slow_period, signal_period) {
            Ok(i) => i,
            Err(_) => return empty(),
        };

    let warmup = slow_period;
    let mut macd_line = Vec::with_capacity(values.len());
    let mut signal_line = Vec::with_capacity(values.len());
    let mut histogram = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let macd_out = indicator.next(value);
        if i + 1 >= warmup {
            macd_line.push(Some(macd_out.macd));
            signal_line.push(Some(macd_out.signal));
            histogram.push(Some(macd_out.histogram));
        } else {
            macd_line.push(None);
            signal_line.push(None);
            histogram.push(None);
        }
    }

    (macd_line, signal_line, histogram)
}

/// Calculate Directional Movement Index (DMI) components using Wilder's smoothing
/// Returns (+DI, -DI)
pub fn dmi(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    if high.is_empty() || period == 0 {
        return (vec![None; high.len()], vec![None; high.len()]);
    }

    let mut plus_dm = vec![0.0; high.len()];
    let mut minus_dm = vec![0.0; high.len()];

    for i in 1..high.len() {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];

        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let smoothed_plus_dm = wilders_smooth(&plus_dm, period);
    let smoothed_minus_dm = wilders_smooth(&minus_dm, period);
    let atr_values = atr(high, low, close, period);

    let mut plus_di = Vec::with_capacity(high.len());
    let mut minus_di = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        match (smoothed_plus_dm[i], smoothed_minus_dm[i], atr_values[i]) {
            (Some(pdm), Some(mdm), Some(atr_val)) if atr_val > 0.0 => {
                plus_di.push(Some(pdm / atr_val * 100.0));
                minus_di.push(Some(mdm / atr_val * 100.0));
            }
            _ => {
                plus_di.push(None);
                minus_di.push(None);
            }
        }
    }

    (plus_di, minus_di)
}

/// Calculate Average Directional Index (ADX) using Wilder's smoothing
///
/// ADX requires 2*period - 1 warmup bars:
/// - First period for DI values to become valid
/// - Second period for ADX smoothing of DX values
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 {
        return vec![None; high.len()];
    }

    let (plus_di, minus_di) = dmi(high, low, close, period);
    let di_start = period - 1;
    let mut result = vec![None; high.len()];

    let dx_values: Vec<f64> = (di_start..high.len())
        .map(|i| match (plus_di[i], minus_di[i]) {
            (Some(pdi), Some(mdi)) if pdi + mdi > 0.0 => (pdi - mdi).abs() / (pdi + mdi) * 100.0,
            _ => 0.0,
        })
        .collect();

    // ADX first valid at bar (di_start + period - 1) = (2*period - 2)
    for (j, smoothed) in wilders_smooth(&dx_values, period).into_iter().enumerate() {
        result[di_start + j] = smoothed;
    }

    result
}

// =============================================================================
// Volume Indicators
// =============================================================================

/// Calculate On-Balance Volume (OBV) using ta crate
pub fn obv(candles: &[Candle]) -> Vec<f64> {
    let mut indicator = OnBalanceVolume::new();
    candles.iter().map(|c| indicator.next(c)).collect()
}

/// Calculate Money Flow Index (MFI) using ta crate
pub fn mfi(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    if candles.is_empty() || period == 0 {
        return vec![None; candles.len()];
    }

    let mut indicator = match TaMFI::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; candles.len()],
    };

    let mut result = Vec::with_capacity(candles.len());

    for (i, candle) in candles.iter().enumerate() {
        let mfi_val = indicator.next(candle);
        if i + 1 >= period {
            result.push(Some(mfi_val));
        } else {
            result.push(None);
        }
    }

    result
}

// =============================================================================
// Tests
// =============================================================================
