//! Simple Moving Average (SMA).
//!
//! Arithmetic mean of the trailing `period` closes.
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::OhlcBar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[OhlcBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        sma_of_series(&closes, self.period)
    }
}

/// Rolling mean of an arbitrary series. A window holding NaN yields NaN.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    // Per-window sum: a NaN only affects the windows that contain it.
    for i in (period - 1)..n {
        let window = &values[(i + 1 - period)..=i];
        result[i] = window.iter().sum::<f64>() / period as f64;
    }
    result
}
