//! Per-pair orchestration
//!
//! Wires the feature builder, labeler, setup machine, trend gate and stop
//! ratchet together for one pair, and runs many pairs in parallel.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::{timeframe_duration, TimedReadings};
use crate::error::SeriesResult;
use crate::features::FeatureBuilder;
use crate::frame::{CandleFrame, Column};
use crate::labeler::{LabelSummary, Labeler};
use crate::multi_timeframe::{project_readings, MultiSymbolMultiTimeframeData};
use crate::ratchet::{StopRatchet, StopUpdate};
use crate::setup::{SetupIndicators, SetupMachine, SetupSignals, TrendGate};
use crate::{Candle, EntryDecision, RegimeReading, SetupState, Side, Symbol, TradeSnapshot};

pub const TREND_ENTER_LONG: &str = "trend_enter_long";
pub const TREND_ENTER_SHORT: &str = "trend_enter_short";

/// Labeled regime-timeframe frame of one pair
#[derive(Debug, Clone)]
pub struct TrainingOutput {
    pub frame: CandleFrame,
    pub summary: LabelSummary,
    pub features_written: bool,
    pub ready: usize,
}

/// Entry-timeframe frame of one pair with its signals
#[derive(Debug, Clone)]
pub struct EntryOutput {
    pub frame: CandleFrame,
    pub signals: SetupSignals,
    pub trend_entries: Vec<EntryDecision>,
    /// Most recent band entry and the ratchet's current stop for it
    pub last_entry: Option<LastEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastEntry {
    pub datetime: DateTime<Utc>,
    pub side: Side,
    pub open_rate: f64,
    pub stop: StopUpdate,
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub pair: Symbol,
    pub timeframe: String,
    pub candles: usize,
    pub ready: usize,
    pub summary: LabelSummary,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub pair: Symbol,
    pub timeframe: String,
    pub candles: usize,
    pub long_entries: usize,
    pub short_entries: usize,
    pub trend_entries: usize,
    pub last_state: SetupState,
    pub last_reading: RegimeReading,
    pub last_entry: Option<LastEntry>,
    pub output: PathBuf,
}

/// Replay the ratchet from `entry` to the last candle, as if a trade had
/// been opened at the entry candle's close.
pub fn trail_stop(
    mut ratchet: StopRatchet,
    pair: &Symbol,
    candles: &[Candle],
    indicators: &SetupIndicators,
    entry: usize,
    side: Side,
) -> Option<StopUpdate> {
    let opened = candles.get(entry)?;
    let open_rate = opened.close;
    let mut last = None;

    for (i, candle) in candles.iter().enumerate().skip(entry) {
        let ctx = indicators.market_context(candles, i)?;
        let trade = TradeSnapshot {
            pair: pair.clone(),
            side,
            open_rate,
            current_rate: candle.close,
            current_profit: TradeSnapshot::profit_at(side, open_rate, candle.close),
            opened_at: opened.datetime,
        };
        last = Some(ratchet.update(&trade, &ctx));
    }

    last
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}] {msg}")?
            .progress_chars("█░ "),
    );
    pb.tick();
    Ok(pb)
}

pub struct Pipeline {
    config: Config,
    features: FeatureBuilder,
    labeler: Labeler,
    machine: SetupMachine,
    gate: TrendGate,
    ratchet: StopRatchet,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            features: FeatureBuilder::new(config.features.clone())?,
            labeler: Labeler::new(config.labels.clone())?,
            machine: SetupMachine::new(config.setup.clone())?,
            gate: TrendGate::new(config.trend.clone())?,
            ratchet: StopRatchet::new(config.ratchet.clone())?,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Features plus forward labels on the regime timeframe
    pub fn build_training_frame(&self, pair: &Symbol, candles: Vec<Candle>) -> SeriesResult<TrainingOutput> {
        let mut frame = CandleFrame::new(pair.clone(), self.config.regime_timeframe(), candles)?;

        let features_written = self.features.populate(&mut frame)?;
        let ready = frame
            .flags(crate::features::FEATURES_READY)
            .map(|r| r.iter().filter(|x| **x).count())
            .unwrap_or(0);
        let summary = self.labeler.populate(&mut frame)?;

        Ok(TrainingOutput {
            frame,
            summary,
            features_written,
            ready,
        })
    }

    /// Setup machine and trend gate on the entry timeframe.
    ///
    /// `readings` holds one regime reading per entry candle.
    pub fn build_entry_frame(
        &self,
        pair: &Symbol,
        candles: Vec<Candle>,
        readings: &[RegimeReading],
    ) -> SeriesResult<EntryOutput> {
        let mut frame = CandleFrame::new(pair.clone(), self.config.data.entry_timeframe.as_str(), candles)?;

        let indicators = self.machine.indicators(frame.candles());
        let signals = self.machine.evaluate_with(frame.candles(), &indicators, readings)?;
        signals.write_columns(&mut frame)?;

        let trend_entries = self.gate.evaluate(frame.candles(), readings)?;
        frame.insert_column(
            TREND_ENTER_LONG,
            Column::Flag(trend_entries.iter().map(|d| *d == EntryDecision::Long).collect()),
        )?;
        frame.insert_column(
            TREND_ENTER_SHORT,
            Column::Flag(trend_entries.iter().map(|d| *d == EntryDecision::Short).collect()),
        )?;

        let last_entry = signals
            .entries
            .iter()
            .rposition(|d| *d != EntryDecision::None)
            .and_then(|idx| {
                let side = signals.entries[idx].side()?;
                let stop = trail_stop(self.ratchet.clone(), pair, frame.candles(), &indicators, idx, side)?;
                let candle = &frame.candles()[idx];
                Some(LastEntry {
                    datetime: candle.datetime,
                    side,
                    open_rate: candle.close,
                    stop,
                })
            });

        Ok(EntryOutput {
            frame,
            signals,
            trend_entries,
            last_entry,
        })
    }

    fn output_path(&self, pair: &Symbol, timeframe: &str, suffix: &str) -> PathBuf {
        Path::new(&self.config.data.results_dir).join(format!(
            "{}_{}_{}.csv",
            pair.file_stem(),
            timeframe,
            suffix
        ))
    }

    /// Label every pair's regime timeframe in parallel and write the frames
    pub fn label_pairs(&self, data: &MultiSymbolMultiTimeframeData) -> Result<Vec<TrainingReport>> {
        let timeframe = self.config.regime_timeframe();
        let mut pairs: Vec<&Symbol> = data.keys().collect();
        pairs.sort();

        let pb = progress_bar(pairs.len())?;
        let results: Vec<Result<TrainingReport>> = pairs
            .par_iter()
            .map(|pair| {
                let result = self.label_pair(pair, data, timeframe);
                pb.inc(1);
                pb.set_message(pair.to_string());
                result
            })
            .collect();
        pb.finish_and_clear();

        collect_reports(results)
    }

    fn label_pair(&self, pair: &Symbol, data: &MultiSymbolMultiTimeframeData, timeframe: &str) -> Result<TrainingReport> {
        let candles = data
            .get(pair)
            .and_then(|mtf| mtf.get(timeframe))
            .with_context(|| format!("{} has no {} candles", pair, timeframe))?
            .to_vec();

        let out = self
            .build_training_frame(pair, candles)
            .with_context(|| format!("Failed to label {}", pair))?;
        let output = self.output_path(pair, timeframe, "regimes");
        out.frame.write_csv(&output)?;

        debug!("{}: wrote {}", pair, output.display());
        Ok(TrainingReport {
            pair: pair.clone(),
            timeframe: timeframe.to_string(),
            candles: out.frame.len(),
            ready: out.ready,
            summary: out.summary,
            output,
        })
    }

    /// Run the entry logic for every pair in parallel and write the frames.
    ///
    /// `predictions` maps pairs to regime-timeframe readings; pairs without
    /// any are scanned with every reading Unavailable.
    pub fn scan_pairs(
        &self,
        data: &MultiSymbolMultiTimeframeData,
        predictions: &HashMap<Symbol, TimedReadings>,
    ) -> Result<Vec<ScanReport>> {
        let entry_tf = self.config.data.entry_timeframe.as_str();
        let coarse = timeframe_duration(self.config.regime_timeframe())?;
        let fine = timeframe_duration(entry_tf)?;

        let mut pairs: Vec<&Symbol> = data.keys().collect();
        pairs.sort();

        let pb = progress_bar(pairs.len())?;
        let results: Vec<Result<ScanReport>> = pairs
            .par_iter()
            .map(|pair| {
                let result = self.scan_pair(pair, data, predictions.get(*pair), coarse, fine);
                pb.inc(1);
                pb.set_message(pair.to_string());
                result
            })
            .collect();
        pb.finish_and_clear();

        collect_reports(results)
    }

    fn scan_pair(
        &self,
        pair: &Symbol,
        data: &MultiSymbolMultiTimeframeData,
        predictions: Option<&TimedReadings>,
        coarse: chrono::Duration,
        fine: chrono::Duration,
    ) -> Result<ScanReport> {
        let entry_tf = self.config.data.entry_timeframe.as_str();
        let candles = data
            .get(pair)
            .and_then(|mtf| mtf.get(entry_tf))
            .with_context(|| format!("{} has no {} candles", pair, entry_tf))?
            .to_vec();

        let readings = match predictions {
            Some(p) => project_readings(p, coarse, &candles, fine),
            None => {
                warn!("{}: no regime predictions, scanning without a regime filter", pair);
                vec![RegimeReading::Unavailable; candles.len()]
            }
        };

        let out = self
            .build_entry_frame(pair, candles, &readings)
            .with_context(|| format!("Failed to scan {}", pair))?;
        let output = self.output_path(pair, entry_tf, "entries");
        out.frame.write_csv(&output)?;

        Ok(ScanReport {
            pair: pair.clone(),
            timeframe: entry_tf.to_string(),
            candles: out.frame.len(),
            long_entries: out.signals.enter_long.iter().filter(|x| **x).count(),
            short_entries: out.signals.enter_short.iter().filter(|x| **x).count(),
            trend_entries: out
                .trend_entries
                .iter()
                .filter(|d| **d != EntryDecision::None)
                .count(),
            last_state: out.signals.last_state(),
            last_reading: readings.last().copied().unwrap_or_default(),
            last_entry: out.last_entry,
            output,
        })
    }
}

/// Keep successful pairs; fail only if every pair failed
fn collect_reports<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let total = results.len();
    let mut reports = Vec::with_capacity(total);
    let mut last_error = None;

    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!("{:#}", e);
                last_error = Some(e);
            }
        }
    }

    if reports.is_empty() {
        if let Some(e) = last_error {
            return Err(e.context("No pair could be processed"));
        }
    }

    info!("Processed {} of {} pairs", reports.len(), total);
    Ok(reports)
}
