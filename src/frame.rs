//! Candle table with named derived columns
//!
//! The frame is the tabular contract shared by the feature builder, the
//! labeler and the setup machine: candles are ordered and immutable, and each
//! component appends columns aligned by position.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::data::validate_sequence;
use crate::error::{SeriesError, SeriesResult};
use crate::{Candle, Regime, Symbol};

/// One derived column
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Flag(Vec<bool>),
    Regime(Vec<Regime>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Flag(v) => v.len(),
            Column::Regime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, row: usize) -> String {
        match self {
            Column::Float(v) => v[row].to_string(),
            Column::Flag(v) => v[row].to_string(),
            Column::Regime(v) => v[row].as_str().to_string(),
        }
    }
}

/// Ordered candles of one pair and timeframe plus derived columns
#[derive(Debug, Clone)]
pub struct CandleFrame {
    pair: Symbol,
    timeframe: String,
    candles: Vec<Candle>,
    columns: BTreeMap<String, Column>,
}

impl CandleFrame {
    /// Build a frame; rejects empty, duplicate or out-of-order candles
    pub fn new(pair: Symbol, timeframe: impl Into<String>, candles: Vec<Candle>) -> SeriesResult<Self> {
        validate_sequence(&candles)?;
        Ok(Self {
            pair,
            timeframe: timeframe.into(),
            candles,
            columns: BTreeMap::new(),
        })
    }

    pub fn pair(&self) -> &Symbol {
        &self.pair
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Add or replace a column. Its length must match the candle count.
    pub fn insert_column(&mut self, name: impl Into<String>, column: Column) -> SeriesResult<()> {
        let name = name.into();
        if column.len() != self.candles.len() {
            return Err(SeriesError::LengthMismatch {
                name,
                expected: self.candles.len(),
                found: column.len(),
            });
        }
        self.columns.insert(name, column);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Column names in output order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn float(&self, name: &str) -> Option<&[f64]> {
        match self.columns.get(name)? {
            Column::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn flags(&self, name: &str) -> Option<&[bool]> {
        match self.columns.get(name)? {
            Column::Flag(v) => Some(v),
            _ => None,
        }
    }

    pub fn regimes(&self, name: &str) -> Option<&[Regime]> {
        match self.columns.get(name)? {
            Column::Regime(v) => Some(v),
            _ => None,
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    /// Write candles and every derived column (in name order) as CSV
    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec![
            "datetime".to_string(),
            "open".to_string(),
            "high".to_string(),
            "low".to_string(),
            "close".to_string(),
            "volume".to_string(),
        ];
        header.extend(self.columns.keys().cloned());
        wtr.write_record(&header)?;

        for (row, c) in self.candles.iter().enumerate() {
            let mut record = vec![
                c.datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
                c.open.to_string(),
                c.high.to_string(),
                c.low.to_string(),
                c.close.to_string(),
                c.volume.to_string(),
            ];
            record.extend(self.columns.values().map(|col| col.cell(row)));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_csv_to(file)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
