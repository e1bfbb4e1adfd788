//! MACD: EMA(fast) − EMA(slow) of closes, with an EMA(signal) signal line.
//!
//! The signal EMA is seeded over the first `signal` defined MACD values.
//! Lookback: slow - 1 for the MACD line, slow + signal - 2 for the signal line.

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::OhlcBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdLine {
    Macd,
    Signal,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    line: MacdLine,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize, line: MacdLine) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be shorter than slow");
        let label = match line {
            MacdLine::Macd => "macd",
            MacdLine::Signal => "macd_signal",
        };
        Self {
            fast,
            slow,
            signal,
            line,
            name: format!("{label}_{fast}_{slow}_{signal}"),
        }
    }

    /// Standard MACD(12, 26, 9) line.
    pub fn standard() -> Self {
        Self::new(12, 26, 9, MacdLine::Macd)
    }

    /// Standard MACD(12, 26, 9) signal line.
    pub fn standard_signal() -> Self {
        Self::new(12, 26, 9, MacdLine::Signal)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.line {
            MacdLine::Macd => self.slow - 1,
            MacdLine::Signal => self.slow + self.signal - 2,
        }
    }

    fn compute(&self, bars: &[OhlcBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        match self.line {
            MacdLine::Macd => macd,
            MacdLine::Signal => ema_of_series(&macd, self.signal),
        }
    }
}
