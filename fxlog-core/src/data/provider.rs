//! Market data source trait and structured error types.
//!
//! The MarketDataSource trait abstracts over where bars come from (OANDA,
//! CSV files, a synthetic generator) so the pipeline can swap implementations
//! and use in-memory doubles in tests.

use std::collections::HashMap;
use thiserror::Error;

use crate::domain::{Granularity, OhlcBar, OhlcSeries, SeriesError, Window};

/// Failures retrieving bars. All are fatal for the instrument's current run.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} from data source: {message}")]
    Http { status: u16, message: String },

    #[error("unknown instrument: {instrument}")]
    UnknownInstrument { instrument: String },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid series: {0}")]
    InvalidSeries(#[from] SeriesError),

    #[error("data error: {0}")]
    Other(String),
}

/// Supplies time-ordered OHLC bars for an instrument.
///
/// Implementations return UTC bars in strictly increasing order and may
/// return fewer bars than requested. No retry happens here.
pub trait MarketDataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn fetch(
        &self,
        instrument: &str,
        granularity: Granularity,
        window: &Window,
    ) -> Result<OhlcSeries, DataError>;

    /// Every instrument this source can serve.
    fn list_instruments(&self) -> Result<Vec<String>, DataError>;
}

/// Restrict time-ordered bars to a window: the last `n`, or those inside
/// `[start, end]`.
pub fn select_window(mut bars: Vec<OhlcBar>, window: &Window) -> Vec<OhlcBar> {
    match window {
        Window::Count(n) => {
            let skip = bars.len().saturating_sub(*n);
            bars.drain(..skip);
            bars
        }
        Window::Range { start, end } => bars
            .into_iter()
            .filter(|b| b.timestamp >= *start && b.timestamp <= *end)
            .collect(),
    }
}

/// In-memory source holding fixed bar vectors per instrument.
#[derive(Debug, Default, Clone)]
pub struct StaticSource {
    bars: HashMap<String, Vec<OhlcBar>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, instrument: impl Into<String>, bars: Vec<OhlcBar>) -> Self {
        self.bars.insert(instrument.into(), bars);
        self
    }
}

impl MarketDataSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(
        &self,
        instrument: &str,
        granularity: Granularity,
        window: &Window,
    ) -> Result<OhlcSeries, DataError> {
        let bars = self
            .bars
            .get(instrument)
            .cloned()
            .ok_or_else(|| DataError::UnknownInstrument {
                instrument: instrument.to_string(),
            })?;
        Ok(OhlcSeries::new(
            instrument,
            granularity,
            select_window(bars, window),
        )?)
    }

    fn list_instruments(&self) -> Result<Vec<String>, DataError> {
        let mut names: Vec<String> = self.bars.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
