//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::granularity::Granularity;

/// OHLC bar for one instrument over one fixed time bucket.
///
/// Timestamps are absolute UTC instants marking the start of the bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl OhlcBar {
    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high bounds the body from above, low from below.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Reasons a bar sequence cannot form a series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("bar {index} at {timestamp} is not after its predecessor")]
    NotIncreasing {
        index: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Time-ordered bars for one instrument over one request window.
///
/// Construction enforces strictly increasing timestamps, which also rules out
/// duplicates. The series is immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OhlcSeries {
    instrument: String,
    granularity: Granularity,
    bars: Vec<OhlcBar>,
}

impl OhlcSeries {
    pub fn new(
        instrument: impl Into<String>,
        granularity: Granularity,
        bars: Vec<OhlcBar>,
    ) -> Result<Self, SeriesError> {
        for (i, pair) in bars.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(SeriesError::NotIncreasing {
                    index: i + 1,
                    timestamp: pair[1].timestamp,
                });
            }
        }
        Ok(Self {
            instrument: instrument.into(),
            granularity,
            bars,
        })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn bars(&self) -> &[OhlcBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&OhlcBar> {
        self.bars.last()
    }

    /// Closing prices in bar order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar_at(minutes: i64, close: f64) -> OhlcBar {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        OhlcBar {
            timestamp: base + Duration::minutes(minutes),
            open: close,
            high: close + 0.001,
            low: close - 0.001,
            close,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(bar_at(0, 1.1).is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = bar_at(0, 1.1);
        bar.high = f64::INFINITY;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = bar_at(0, 1.1);
        bar.high = 1.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn series_accepts_increasing_timestamps() {
        let series =
            OhlcSeries::new("EUR_USD", Granularity::M1, vec![bar_at(0, 1.0), bar_at(1, 1.1)])
                .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![1.0, 1.1]);
        assert_eq!(series.instrument(), "EUR_USD");
    }

    #[test]
    fn series_rejects_duplicate_timestamps() {
        let err = OhlcSeries::new("EUR_USD", Granularity::M1, vec![bar_at(0, 1.0), bar_at(0, 1.1)])
            .unwrap_err();
        assert!(matches!(err, SeriesError::NotIncreasing { index: 1, .. }));
    }

    #[test]
    fn series_rejects_out_of_order_bars() {
        let bars = vec![bar_at(0, 1.0), bar_at(5, 1.1), bar_at(3, 1.2)];
        let err = OhlcSeries::new("EUR_USD", Granularity::M1, bars).unwrap_err();
        assert!(matches!(err, SeriesError::NotIncreasing { index: 2, .. }));
    }

    #[test]
    fn empty_series_is_constructible() {
        let series = OhlcSeries::new("EUR_USD", Granularity::H1, Vec::new()).unwrap();
        assert!(series.is_empty());
        assert!(series.last().is_none());
    }
}
