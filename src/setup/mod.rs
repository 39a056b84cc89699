//! Setup State Machine
//!
//! Band pullback entries inside a long-term trend. A setup becomes "potential"
//! when price stretches beyond the outer band on the trend side, stays sticky
//! until the trend structure breaks, and only turns into an entry on the
//! candle where price crosses back over the band.

mod config;
mod machine;
mod trend_gate;

pub use config::{SetupConfig, TrendConfig};
pub use machine::{SetupIndicators, SetupMachine, SetupSignals};
pub use trend_gate::TrendGate;

pub const POTENTIAL_LONG: &str = "is_potential_long";
pub const POTENTIAL_SHORT: &str = "is_potential_short";
pub const LONG_TRIGGER: &str = "long_trigger";
pub const SHORT_TRIGGER: &str = "short_trigger";
pub const ENTER_LONG: &str = "enter_long";
pub const ENTER_SHORT: &str = "enter_short";

/// Sticky setup recurrence: `state[i] = entry[i] || (state[i - 1] && !invalidation[i])`.
///
/// One left-to-right pass carrying a single bool; the state before the first
/// candle is inactive.
pub fn scan_setup(entry: &[bool], invalidation: &[bool]) -> Vec<bool> {
    let mut active = false;
    entry
        .iter()
        .zip(invalidation)
        .map(|(&enter, &invalid)| {
            active = enter || (active && !invalid);
            active
        })
        .collect()
}

/// True where `values` moves from at-or-below the level to above it.
///
/// Both sides compare against the level of the tested candle. Index 0 and
/// candles with an undefined level never fire.
pub fn crossed_above(values: &[f64], level: &[Option<f64>]) -> Vec<bool> {
    (0..values.len())
        .map(|i| match level.get(i).copied().flatten() {
            Some(l) if i > 0 => values[i] > l && values[i - 1] <= l,
            _ => false,
        })
        .collect()
}

/// True where `values` moves from at-or-above the level to below it
pub fn crossed_below(values: &[f64], level: &[Option<f64>]) -> Vec<bool> {
    (0..values.len())
        .map(|i| match level.get(i).copied().flatten() {
            Some(l) if i > 0 => values[i] < l && values[i - 1] >= l,
            _ => false,
        })
        .collect()
}
