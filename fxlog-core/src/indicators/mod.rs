//! Technical indicators over closing prices.
//!
//! Each indicator computes its whole output series from a bar slice; the
//! engine reads the last value. The first `lookback()` values are NaN
//! (warmup), and NaN inputs propagate rather than being papered over.

pub mod bollinger;
pub mod ema;
pub mod engine;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use bollinger::{Bollinger, BollingerBand};
pub use ema::{ema_of_series, Ema};
pub use engine::{IndicatorEngine, IndicatorError, MIN_BARS};
pub use macd::{Macd, MacdLine};
pub use rsi::Rsi;
pub use sma::Sma;

use crate::domain::OhlcBar;

/// An indicator: bar history in, same-length numeric series out.
///
/// No value at bar t may depend on bars after t.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of leading bars with no valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[OhlcBar]) -> Vec<f64>;
}

/// Synthetic hourly bars from close prices, for tests.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<OhlcBar> {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            OhlcBar {
                timestamp: base + Duration::hours(i as i64),
                open,
                high: open.max(close) + 0.001,
                low: open.min(close) - 0.001,
                close,
            }
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
