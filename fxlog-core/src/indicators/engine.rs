//! IndicatorEngine: the fixed indicator set at the most recent bar.
//!
//! | attribute     | definition                                   |
//! |---------------|----------------------------------------------|
//! | `SMA_20`      | mean of the trailing 20 closes               |
//! | `SMA_50`      | mean of the trailing 50 closes               |
//! | `EMA_20`      | EMA(20), alpha = 2/21, SMA(20)-seeded        |
//! | `RSI_14`      | Wilder RSI(14)                               |
//! | `MACD`        | EMA(12) − EMA(26)                            |
//! | `MACD_Signal` | EMA(9) of MACD                               |
//! | `BB_Upper`    | SMA(20) + 2 × population stddev(20)          |
//! | `BB_Lower`    | SMA(20) − 2 × population stddev(20)          |
//!
//! Fewer than [`MIN_BARS`] bars is an error, never a partial result.

use thiserror::Error;

use super::{Bollinger, Ema, Indicator, Macd, Rsi, Sma};
use crate::domain::{IndicatorKind, IndicatorSet, OhlcSeries};

/// Bars required before every indicator in the set is defined.
pub const MIN_BARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("insufficient history: {available} bars available, {required} required")]
    InsufficientHistory { required: usize, available: usize },

    #[error("indicator {indicator} is undefined at the latest bar")]
    Undefined { indicator: &'static str },
}

/// Computes the fixed [`IndicatorSet`] for a series.
pub struct IndicatorEngine {
    indicators: Vec<(IndicatorKind, Box<dyn Indicator>)>,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorEngine {
    pub fn new() -> Self {
        let indicators: Vec<(IndicatorKind, Box<dyn Indicator>)> = vec![
            (IndicatorKind::Sma20, Box::new(Sma::new(20))),
            (IndicatorKind::Sma50, Box::new(Sma::new(50))),
            (IndicatorKind::Ema20, Box::new(Ema::new(20))),
            (IndicatorKind::Rsi14, Box::new(Rsi::new(14))),
            (IndicatorKind::Macd, Box::new(Macd::standard())),
            (IndicatorKind::MacdSignal, Box::new(Macd::standard_signal())),
            (IndicatorKind::BbUpper, Box::new(Bollinger::upper(20, 2.0))),
            (IndicatorKind::BbLower, Box::new(Bollinger::lower(20, 2.0))),
        ];
        Self { indicators }
    }

    /// Smallest series length that defines every indicator.
    pub fn required_bars(&self) -> usize {
        let longest = self
            .indicators
            .iter()
            .map(|(_, ind)| ind.lookback() + 1)
            .max()
            .unwrap_or(0);
        longest.max(MIN_BARS)
    }

    pub fn compute(&self, series: &OhlcSeries) -> Result<IndicatorSet, IndicatorError> {
        let required = self.required_bars();
        if series.len() < required {
            return Err(IndicatorError::InsufficientHistory {
                required,
                available: series.len(),
            });
        }

        let bars = series.bars();
        let mut set = IndicatorSet {
            sma_20: f64::NAN,
            sma_50: f64::NAN,
            ema_20: f64::NAN,
            rsi_14: f64::NAN,
            macd: f64::NAN,
            macd_signal: f64::NAN,
            bb_upper: f64::NAN,
            bb_lower: f64::NAN,
        };
        for (kind, indicator) in &self.indicators {
            let latest = indicator
                .compute(bars)
                .last()
                .copied()
                .filter(|v| v.is_finite())
                .ok_or(IndicatorError::Undefined {
                    indicator: kind.attribute(),
                })?;
            match kind {
                IndicatorKind::Sma20 => set.sma_20 = latest,
                IndicatorKind::Sma50 => set.sma_50 = latest,
                IndicatorKind::Ema20 => set.ema_20 = latest,
                IndicatorKind::Rsi14 => set.rsi_14 = latest,
                IndicatorKind::Macd => set.macd = latest,
                IndicatorKind::MacdSignal => set.macd_signal = latest,
                IndicatorKind::BbUpper => set.bb_upper = latest,
                IndicatorKind::BbLower => set.bb_lower = latest,
            }
        }
        Ok(set)
    }
}
