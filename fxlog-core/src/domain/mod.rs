//! Domain types: bars, series, granularity, trade ids and records.

pub mod bar;
pub mod granularity;
pub mod ids;
pub mod record;

pub use bar::{OhlcBar, OhlcSeries, SeriesError};
pub use granularity::{format_timestamp, parse_timestamp, Granularity, GranularityError, Window};
pub use ids::TradeId;
pub use record::{IndicatorKind, IndicatorSet, RecordError, TradeRecord};

/// Instrument identifier, e.g. `EUR_USD`. Opaque to the pipeline.
pub type Instrument = String;
