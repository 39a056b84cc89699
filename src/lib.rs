//! Regime Strategies
//!
//! Regime labeling and entry logic for crypto strategies: a feature builder
//! and forward-looking labeler that produce classifier training data on a
//! coarse timeframe, a sticky setup state machine that turns band pullbacks
//! into edge-triggered entries on a fine timeframe, and a tighten-only stop
//! ratchet for open trades.
//!
//! Order routing, execution and persistence belong to the host engine; this
//! crate only reads candles and trade snapshots and returns columns, entry
//! decisions and stop prices.
//!
//! ## Labeling Example
//! ```no_run
//! use regime_strategies::labeler::{LabelConfig, Labeler};
//!
//! fn main() -> anyhow::Result<()> {
//!     let candles = regime_strategies::data::load_csv("data/BTCUSDT_4h.csv")?;
//!     let labels = Labeler::new(LabelConfig::default())?.label(&candles)?;
//!     let summary = labels.summary();
//!     println!("bull {} / neutral {} / bear {}", summary.bull, summary.neutral, summary.bear);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod frame;
pub mod indicators;
pub mod labeler;
pub mod multi_timeframe;
pub mod pipeline;
pub mod ratchet;
pub mod relay;
pub mod setup;
pub mod types;

pub use config::Config;
pub use error::{SeriesError, SeriesResult};
pub use frame::{CandleFrame, Column};
pub use multi_timeframe::{MultiSymbolMultiTimeframeData, MultiTimeframeData};
pub use types::*;
