//! Market data sources.
//!
//! Every source implements [`MarketDataSource`] and returns a validated
//! [`OhlcSeries`](crate::domain::OhlcSeries).

pub mod csv_source;
pub mod oanda;
pub mod provider;
pub mod synthetic;

pub use csv_source::CsvSource;
pub use oanda::{OandaSettings, OandaSource, PRACTICE_API_URL};
pub use provider::{select_window, DataError, MarketDataSource, StaticSource};
pub use synthetic::SyntheticSource;
