//! Deterministic random-walk bars for demos and dry runs.
//!
//! The walk is seeded from the configured seed and the instrument name, so the
//! same request always yields the same bars.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataError, MarketDataSource};
use crate::domain::{Granularity, OhlcBar, OhlcSeries, Window};

const DEFAULT_INSTRUMENTS: [&str; 4] = ["EUR_USD", "GBP_USD", "USD_JPY", "AUD_USD"];

pub struct SyntheticSource {
    seed: u64,
    /// Close of the latest bar in a count window; `None` means now.
    anchor: Option<DateTime<Utc>>,
    instruments: Vec<String>,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            anchor: None,
            instruments: DEFAULT_INSTRUMENTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Pin the end of count windows, for reproducible timestamps.
    pub fn anchored_at(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn with_instruments(mut self, instruments: Vec<String>) -> Self {
        self.instruments = instruments;
        self
    }

    fn rng_for(&self, instrument: &str) -> StdRng {
        // FNV-1a over the name, folded into the seed.
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in instrument.bytes() {
            h ^= u64::from(b);
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
        StdRng::seed_from_u64(self.seed ^ h)
    }

    fn start_price(instrument: &str) -> f64 {
        if instrument.ends_with("_JPY") {
            150.0
        } else {
            1.1
        }
    }
}

/// Bucket start times covering the window, oldest first.
fn timestamps(
    granularity: Granularity,
    window: &Window,
    anchor: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let step = granularity.seconds();
    match window {
        Window::Count(n) => {
            let last = anchor.timestamp().div_euclid(step) * step - step;
            (0..*n as i64)
                .rev()
                .filter_map(|k| DateTime::from_timestamp(last - k * step, 0))
                .collect()
        }
        Window::Range { start, end } => {
            let first = (start.timestamp() + step - 1).div_euclid(step) * step;
            let mut out = Vec::new();
            let mut t = first;
            while t <= end.timestamp() {
                if let Some(ts) = DateTime::from_timestamp(t, 0) {
                    out.push(ts);
                }
                t += step;
            }
            out
        }
    }
}

impl MarketDataSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        instrument: &str,
        granularity: Granularity,
        window: &Window,
    ) -> Result<OhlcSeries, DataError> {
        if !self.instruments.iter().any(|i| i == instrument) {
            return Err(DataError::UnknownInstrument {
                instrument: instrument.to_string(),
            });
        }

        let anchor = self.anchor.unwrap_or_else(Utc::now);
        let mut rng = self.rng_for(instrument);
        let vol = 0.0015 * (granularity.seconds() as f64 / 3_600.0).sqrt();
        let mut price = Self::start_price(instrument);

        let bars = timestamps(granularity, window, anchor)
            .into_iter()
            .map(|timestamp| {
                let ret: f64 = rng.gen_range(-vol..=vol);
                let open = price;
                let close = price * (1.0 + ret);
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..vol / 2.0 + f64::EPSILON));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..vol / 2.0 + f64::EPSILON));
                price = close;
                OhlcBar {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                }
            })
            .collect();

        Ok(OhlcSeries::new(instrument, granularity, bars)?)
    }

    fn list_instruments(&self) -> Result<Vec<String>, DataError> {
        Ok(self.instruments.clone())
    }
}
