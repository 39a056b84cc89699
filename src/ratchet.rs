//! Tighten-only stop-loss ratchet
//!
//! Each update proposes candidate stops (ATR floor, middle band, profit trail,
//! optional break-even) and keeps the tightest one, but never hands back a
//! stop looser than the last one it returned for the trade.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{require_non_negative, SeriesError, SeriesResult};
use crate::indicators::safe_ratio;
use crate::{Side, TradeSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatchetConfig {
    /// ATR multiple between the close and the floor
    pub atr_risk_factor: f64,
    /// Profit fraction at which the trailing stop engages
    pub trailing_offset: f64,
    /// Trailing distance as a fraction of the current rate
    pub trailing_distance: f64,
    /// Profit fraction that moves the stop to break-even (disabled when None)
    pub breakeven_trigger: Option<f64>,
    /// Break-even lock-in above (long) or below (short) the open rate
    pub breakeven_offset: f64,
    /// ATR stand-in as a fraction of the close when ATR is undefined
    pub fallback_atr_pct: f64,
}

impl Default for RatchetConfig {
    fn default() -> Self {
        Self {
            atr_risk_factor: 1.4,
            trailing_offset: 0.05,
            trailing_distance: 0.02,
            breakeven_trigger: None,
            breakeven_offset: 0.001,
            fallback_atr_pct: 0.05,
        }
    }
}

impl RatchetConfig {
    pub fn validate(&self) -> SeriesResult<()> {
        require_non_negative("atr_risk_factor", self.atr_risk_factor)?;
        require_non_negative("trailing_offset", self.trailing_offset)?;
        require_non_negative("trailing_distance", self.trailing_distance)?;
        require_non_negative("breakeven_offset", self.breakeven_offset)?;
        require_non_negative("fallback_atr_pct", self.fallback_atr_pct)?;
        if let Some(trigger) = self.breakeven_trigger {
            require_non_negative("breakeven_trigger", trigger)?;
        }
        if self.trailing_distance >= 1.0 {
            return Err(SeriesError::invalid("trailing_distance", "must be below 1.0"));
        }
        Ok(())
    }
}

/// Values of the last analyzed candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketContext {
    pub close: f64,
    pub band_middle: Option<f64>,
    pub atr: Option<f64>,
}

/// Result of one ratchet step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopUpdate {
    pub stop_price: f64,
    /// `(stop - open_rate) / open_rate`: negative below entry, positive above
    pub stop_ratio: f64,
    /// Whether the stop moved versus the previous one
    pub tightened: bool,
}

/// `(stop - open_rate) / open_rate`
pub fn stop_ratio(stop: f64, open_rate: f64) -> f64 {
    safe_ratio(stop - open_rate, open_rate).unwrap_or(0.0)
}

/// ATR floor below (long) or above (short) the close
pub fn initial_stop(side: Side, ctx: &MarketContext, config: &RatchetConfig) -> f64 {
    let atr = ctx
        .atr
        .filter(|a| a.is_finite() && *a > 0.0)
        .unwrap_or(ctx.close * config.fallback_atr_pct);
    let distance = atr * config.atr_risk_factor;

    match side {
        Side::Long => ctx.close - distance,
        Side::Short => ctx.close + distance,
    }
}

/// Whether `candidate` is at least as tight as `reference` for `side`
fn at_least_as_tight(side: Side, candidate: f64, reference: f64) -> bool {
    match side {
        Side::Long => candidate >= reference,
        Side::Short => candidate <= reference,
    }
}

/// Stop state of one open trade
#[derive(Debug, Clone)]
pub struct StopRatchet {
    config: RatchetConfig,
    stop: Option<f64>,
}

impl StopRatchet {
    pub fn new(config: RatchetConfig) -> SeriesResult<Self> {
        config.validate()?;
        Ok(Self { config, stop: None })
    }

    /// Resume from a stop persisted by the host
    pub fn with_stop(mut self, stop: f64) -> Self {
        self.stop = Some(stop).filter(|s| s.is_finite());
        self
    }

    pub fn current(&self) -> Option<f64> {
        self.stop
    }

    pub fn config(&self) -> &RatchetConfig {
        &self.config
    }

    /// Propose a new stop for `trade`; the result never loosens.
    pub fn update(&mut self, trade: &TradeSnapshot, ctx: &MarketContext) -> StopUpdate {
        let cfg = &self.config;
        let side = trade.side;
        let floor = initial_stop(side, ctx, cfg);
        let previous = self.stop;
        let base = previous.unwrap_or(floor);

        let mut candidates = vec![base];

        // Band ratchet once price is back on the profitable side of the middle band
        if let Some(middle) = ctx.band_middle.filter(|m| m.is_finite()) {
            let past_middle = match side {
                Side::Long => ctx.close >= middle,
                Side::Short => ctx.close <= middle,
            };
            if past_middle {
                if at_least_as_tight(side, floor, middle) && at_least_as_tight(side, floor, base) {
                    candidates.push(floor);
                } else if at_least_as_tight(side, middle, base) {
                    candidates.push(middle);
                }
            }
        }

        if trade.current_profit >= cfg.trailing_offset {
            candidates.push(match side {
                Side::Long => trade.current_rate * (1.0 - cfg.trailing_distance),
                Side::Short => trade.current_rate * (1.0 + cfg.trailing_distance),
            });
        }

        if let Some(trigger) = cfg.breakeven_trigger {
            if trade.current_profit > trigger {
                candidates.push(match side {
                    Side::Long => trade.open_rate * (1.0 + cfg.breakeven_offset),
                    Side::Short => trade.open_rate * (1.0 - cfg.breakeven_offset),
                });
            }
        }

        let tightest = candidates
            .into_iter()
            .filter(|c| c.is_finite())
            .fold(base, |best, c| if at_least_as_tight(side, c, best) { c } else { best });

        let tightened = previous.is_some_and(|p| tightest != p);
        if tightened {
            debug!(
                "{} {:?} stop {:.6} -> {:.6} (profit {:.2}%)",
                trade.pair,
                side,
                base,
                tightest,
                trade.current_profit * 100.0
            );
        }

        self.stop = Some(tightest);
        StopUpdate {
            stop_price: tightest,
            stop_ratio: stop_ratio(tightest, trade.open_rate),
            tightened,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn trade(side: Side, open: f64, rate: f64) -> TradeSnapshot {
        TradeSnapshot {
            pair: Symbol::new("BTCUSDT"),
            side,
            open_rate: open,
            current_rate: rate,
            current_profit: TradeSnapshot::profit_at(side, open, rate),
            opened_at: Utc::now(),
        }
    }

    fn ctx(close: f64, middle: f64, atr: f64) -> MarketContext {
        MarketContext {
            close,
            band_middle: Some(middle),
            atr: Some(atr),
        }
    }

    /// Deterministic price path for monotonicity checks
    fn wobble(count: usize) -> Vec<f64> {
        let mut seed: u64 = 42;
        let mut price = 100.0;
        (0..count)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let step = ((seed >> 33) % 1000) as f64 / 1000.0 - 0.5;
                price = (price * (1.0 + step * 0.04)).max(1.0);
                price
            })
            .collect()
    }

    #[test]
    fn test_seed_from_atr_floor() {
        let mut ratchet = StopRatchet::new(RatchetConfig::default()).unwrap();
        let update = ratchet.update(&trade(Side::Long, 100.0, 100.0), &ctx(100.0, 105.0, 2.0));

        assert_relative_eq!(update.stop_price, 100.0 - 2.0 * 1.4);
        assert!(update.stop_ratio < 0.0);
        assert!(!update.tightened);
    }

    #[test]
    fn test_fallback_when_atr_undefined() {
        let mut ratchet = StopRatchet::new(RatchetConfig::default()).unwrap();
        let context = MarketContext {
            close: 100.0,
            band_middle: None,
            atr: None,
        };
        let update = ratchet.update(&trade(Side::Short, 100.0, 100.0), &context);
        assert_relative_eq!(update.stop_price, 100.0 + 5.0 * 1.4);
        assert!(update.stop_ratio > 0.0);
    }

    #[test]
    fn test_long_middle_band_ratchet() {
        let mut ratchet = StopRatchet::new(RatchetConfig::default()).unwrap().with_stop(95.0);
        // Close above middle, floor (102 - 2.8 = 99.2) below middle 100: take the middle band
        let update = ratchet.update(&trade(Side::Long, 98.0, 102.0), &ctx(102.0, 100.0, 2.0));
        assert_relative_eq!(update.stop_price, 100.0);
        assert!(update.tightened);

        // Floor above the middle band and the previous stop wins
        let update = ratchet.update(&trade(Side::Long, 98.0, 104.0), &ctx(104.0, 100.0, 1.0));
        assert_relative_eq!(update.stop_price, 104.0 - 1.4);
    }

    #[test]
    fn test_trailing_engages_at_offset() {
        let mut ratchet = StopRatchet::new(RatchetConfig::default()).unwrap().with_stop(90.0);
        let update = ratchet.update(&trade(Side::Long, 100.0, 110.0), &ctx(110.0, 120.0, 3.0));
        assert_relative_eq!(update.stop_price, 110.0 * 0.98);
        assert!(update.stop_ratio > 0.0);

        let mut short = StopRatchet::new(RatchetConfig::default()).unwrap().with_stop(110.0);
        let update = short.update(&trade(Side::Short, 100.0, 90.0), &ctx(90.0, 80.0, 3.0));
        assert_relative_eq!(update.stop_price, 90.0 * 1.02);
        assert!(update.stop_ratio < 0.0);
    }

    #[test]
    fn test_breakeven_optional() {
        let config = RatchetConfig {
            breakeven_trigger: Some(0.04),
            ..RatchetConfig::default()
        };
        let mut on = StopRatchet::new(config).unwrap().with_stop(95.0);
        let update = on.update(&trade(Side::Long, 100.0, 104.5), &ctx(104.5, 110.0, 5.0));
        assert_relative_eq!(update.stop_price, 100.1);

        let mut off = StopRatchet::new(RatchetConfig::default()).unwrap().with_stop(95.0);
        let update = off.update(&trade(Side::Long, 100.0, 104.5), &ctx(104.5, 110.0, 5.0));
        assert_relative_eq!(update.stop_price, 95.0);
    }

    #[test]
    fn test_never_loosens_after_restore() {
        let mut ratchet = StopRatchet::new(RatchetConfig::default()).unwrap().with_stop(99.0);
        let update = ratchet.update(&trade(Side::Long, 100.0, 90.0), &ctx(90.0, 95.0, 4.0));
        assert_relative_eq!(update.stop_price, 99.0);
        assert!(!update.tightened);
    }

    #[test]
    fn test_monotonic_long_and_short() {
        let path = wobble(300);
        for side in [Side::Long, Side::Short] {
            let mut ratchet = StopRatchet::new(RatchetConfig::default()).unwrap();
            let open = path[0];
            let mut last: Option<f64> = None;

            for (i, &price) in path.iter().enumerate() {
                let middle = path[i.saturating_sub(20)..=i].iter().sum::<f64>()
                    / (i - i.saturating_sub(20) + 1) as f64;
                let update = ratchet.update(&trade(side, open, price), &ctx(price, middle, price * 0.01));

                if let Some(prev) = last {
                    match side {
                        Side::Long => assert!(update.stop_price >= prev, "long loosened at {}", i),
                        Side::Short => assert!(update.stop_price <= prev, "short loosened at {}", i),
                    }
                }
                last = Some(update.stop_price);
            }
        }
    }
}
