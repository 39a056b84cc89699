//! Error types for candle series processing

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while validating or transforming a candle series.
///
/// These are fatal for the whole batch: downstream state depends on strict
/// temporal order and aligned columns.
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("candle series is empty")]
    Empty,

    #[error("timestamps out of order at index {index}: {current} follows {previous}")]
    OutOfOrder {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("duplicate timestamp {timestamp} at index {index}")]
    Duplicate {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("column '{name}' has {found} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unknown timeframe '{0}'")]
    UnknownTimeframe(String),
}

impl SeriesError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SeriesError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type SeriesResult<T> = Result<T, SeriesError>;

/// Reject zero periods before they reach an indicator
pub(crate) fn require_period(name: &'static str, value: usize) -> SeriesResult<()> {
    if value == 0 {
        return Err(SeriesError::invalid(name, "must be at least 1"));
    }
    Ok(())
}

/// Reject negative or non-finite multipliers and fractions
pub(crate) fn require_non_negative(name: &'static str, value: f64) -> SeriesResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SeriesError::invalid(
            name,
            format!("must be a finite non-negative number, got {}", value),
        ));
    }
    Ok(())
}
