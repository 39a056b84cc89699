//! Data loading and management
//!
//! Loads OHLCV candles and classifier predictions from CSV files, checks that a
//! series is strictly ordered, and maps interval names to durations.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{SeriesError, SeriesResult};
use crate::multi_timeframe::{MultiSymbolMultiTimeframeData, MultiTimeframeData};
use crate::{Candle, RegimeConfidence, RegimeReading, Symbol};

// =============================================================================
// Constants
// =============================================================================

/// Valid candle intervals
pub const INTERVALS: &[&str] = &[
    "1m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
];

/// Length of one candle of the given interval
pub fn timeframe_duration(timeframe: &str) -> SeriesResult<Duration> {
    let unknown = || SeriesError::UnknownTimeframe(timeframe.to_string());

    if !INTERVALS.contains(&timeframe) {
        return Err(unknown());
    }

    let (count, unit) = timeframe.split_at(timeframe.len() - 1);
    let count: i64 = count.parse().map_err(|_| unknown())?;

    match unit {
        "m" => Ok(Duration::minutes(count)),
        "h" => Ok(Duration::hours(count)),
        "d" => Ok(Duration::days(count)),
        "w" => Ok(Duration::weeks(count)),
        _ => Err(unknown()),
    }
}

/// `{data_dir}/{PAIR}_{timeframe}.csv`
pub fn candle_path(data_dir: impl AsRef<Path>, pair: &Symbol, timeframe: &str) -> PathBuf {
    data_dir
        .as_ref()
        .join(format!("{}_{}.csv", pair.file_stem(), timeframe))
}

// =============================================================================
// Sequence Validation
// =============================================================================

/// Check that timestamps strictly increase.
///
/// Duplicates and reordering are fatal for a batch: setup state and forward
/// labels both depend on positional order.
pub fn validate_sequence(candles: &[Candle]) -> SeriesResult<()> {
    if candles.is_empty() {
        return Err(SeriesError::Empty);
    }

    for (i, pair) in candles.windows(2).enumerate() {
        let (previous, current) = (pair[0].datetime, pair[1].datetime);
        if current == previous {
            return Err(SeriesError::Duplicate {
                index: i + 1,
                timestamp: current,
            });
        }
        if current < previous {
            return Err(SeriesError::OutOfOrder {
                index: i + 1,
                previous,
                current,
            });
        }
    }

    Ok(())
}

// =============================================================================
// CSV Data Loading
// =============================================================================

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Try parsing without timezone and assume UTC
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .with_context(|| format!("Failed to parse datetime: {}", value))
}

/// Load OHLCV data from CSV file with validation
///
/// Individually invalid candles are skipped with a warning; the surviving
/// sequence must still be strictly ordered.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut candles = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let datetime = parse_timestamp(record.get(0).context("Missing datetime column")?)?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Missing {} column", name))?
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse {} at row {}", name, row_idx + 2))
        };

        let open = field(1, "open")?;
        let high = field(2, "high")?;
        let low = field(3, "low")?;
        let close = field(4, "close")?;
        let volume = field(5, "volume")?;

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                invalid_count += 1;
                warn!(
                    "Skipping invalid candle at row {} in {:?}: {}",
                    row_idx + 2, // +2 for 1-indexed and header row
                    path.file_name().unwrap_or_default(),
                    e
                );
            }
        }
    }

    if invalid_count > 0 {
        warn!(
            "Skipped {} invalid candles out of {} in {:?}",
            invalid_count,
            invalid_count + candles.len(),
            path.file_name().unwrap_or_default()
        );
    }

    validate_sequence(&candles).with_context(|| format!("Invalid series in {}", path.display()))?;

    Ok(candles)
}

/// Filter candles by date range
pub fn filter_candles_by_date(
    candles: Vec<Candle>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<Candle> {
    candles
        .into_iter()
        .filter(|c| {
            let after_start = start.is_none_or(|s| c.datetime >= s);
            let before_end = end.is_none_or(|e| c.datetime <= e);
            after_start && before_end
        })
        .collect()
}

/// Parse a date string (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS) to DateTime<Utc>
pub fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = date_str.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }

    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(date_str, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }

    // Date only: start of day
    if let Ok(nd) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        let ndt = nd.and_time(NaiveTime::MIN);
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }

    anyhow::bail!(
        "Failed to parse date: {}. Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS format",
        date_str
    )
}

/// Load every requested timeframe for every pair, in parallel across pairs.
///
/// Pairs with no loadable file are skipped with a warning; the call fails only
/// when nothing at all could be loaded.
pub fn load_pair_timeframes(
    data_dir: impl AsRef<Path>,
    pairs: &[Symbol],
    timeframes: &[&str],
    primary_timeframe: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<MultiSymbolMultiTimeframeData> {
    use rayon::prelude::*;

    if timeframes.is_empty() {
        anyhow::bail!("At least one timeframe must be specified");
    }

    if !timeframes.contains(&primary_timeframe) {
        anyhow::bail!(
            "Primary timeframe '{}' must be in timeframes list: {:?}",
            primary_timeframe,
            timeframes
        );
    }

    let data_path = data_dir.as_ref().to_path_buf();

    let results: Vec<_> = pairs
        .par_iter()
        .map(|pair| {
            let mut mtf_data = MultiTimeframeData::new(primary_timeframe);

            for &timeframe in timeframes {
                let path = candle_path(&data_path, pair, timeframe);

                if !path.exists() {
                    warn!(
                        "Data file not found: {} (pair: {}, timeframe: {})",
                        path.display(),
                        pair,
                        timeframe
                    );
                    continue;
                }

                match load_csv(&path) {
                    Ok(candles) => {
                        let original_len = candles.len();
                        let candles = filter_candles_by_date(candles, start, end);

                        if candles.is_empty() {
                            warn!("No {} candles for {} inside the date range", timeframe, pair);
                            continue;
                        }

                        info!(
                            "Loaded {} candles for {} {} (from {} total)",
                            candles.len(),
                            pair,
                            timeframe,
                            original_len
                        );
                        mtf_data.add_timeframe(timeframe, candles);
                    }
                    Err(e) => {
                        warn!("Failed to load {} {}: {:#}", pair, timeframe, e);
                    }
                }
            }

            (!mtf_data.timeframes().is_empty()).then(|| (pair.clone(), mtf_data))
        })
        .collect();

    let data: MultiSymbolMultiTimeframeData = results.into_iter().flatten().collect();

    if data.is_empty() {
        anyhow::bail!("No data loaded for any pair-timeframe combination");
    }

    Ok(data)
}

// =============================================================================
// Classifier Predictions
// =============================================================================

/// Regime readings keyed by the open time of the candle they describe
pub type TimedReadings = Vec<(DateTime<Utc>, RegimeReading)>;

/// Load classifier output (`datetime,BEAR,NEUTRAL,BULL`).
///
/// A row whose probabilities are empty means the model was still training
/// for that candle and becomes `RegimeReading::Pending`.
pub fn load_predictions(path: impl AsRef<Path>) -> Result<TimedReadings> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open predictions file {}", path.display()))?;

    let headers = reader.headers().context("Predictions file has no header")?.clone();
    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .with_context(|| format!("Predictions file is missing the {} column", name))
    };
    let (bear_col, neutral_col, bull_col) = (column("BEAR")?, column("NEUTRAL")?, column("BULL")?);

    let mut readings: TimedReadings = Vec::new();
    let mut pending = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        let datetime = parse_timestamp(record.get(0).context("Missing datetime column")?)?;

        let probability = |idx: usize| -> Result<f64> {
            match record.get(idx).map(str::trim) {
                None | Some("") => Ok(f64::NAN),
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("Bad probability '{}' at row {}", raw, row_idx + 2)),
            }
        };

        let confidence = RegimeConfidence::new(
            probability(bear_col)?,
            probability(neutral_col)?,
            probability(bull_col)?,
        );
        let reading = RegimeReading::from_confidence(confidence);
        if reading == RegimeReading::Pending {
            pending += 1;
        }

        if let Some((previous, _)) = readings.last() {
            if datetime <= *previous {
                anyhow::bail!(
                    "Predictions out of order at row {}: {} follows {}",
                    row_idx + 2,
                    datetime,
                    previous
                );
            }
        }
        readings.push((datetime, reading));
    }

    info!(
        "Loaded {} regime predictions from {:?} ({} pending)",
        readings.len(),
        path.file_name().unwrap_or_default(),
        pending
    );

    Ok(readings)
}

// =============================================================================
// Tests
// =============================================================================
