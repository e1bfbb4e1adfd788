//! Offline CSV data source.
//!
//! Reads `<dir>/<instrument>.csv` with a `timestamp,open,high,low,close`
//! header. Timestamps are RFC 3339 or epoch seconds. Rows must already be in
//! time order; the window is applied after loading.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::provider::{select_window, DataError, MarketDataSource};
use crate::domain::{Granularity, OhlcBar, OhlcSeries, Window};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, instrument: &str) -> PathBuf {
        self.dir.join(format!("{instrument}.csv"))
    }
}

fn parse_row_timestamp(raw: &str) -> Result<DateTime<Utc>, DataError> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| DataError::Other(format!("epoch timestamp out of range: {secs}")));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DataError::Other(format!("bad timestamp '{raw}': {e}")))
}

/// Load every row of a CSV file as bars.
pub fn load_bars(path: &Path) -> Result<Vec<OhlcBar>, DataError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut bars = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        bars.push(OhlcBar {
            timestamp: parse_row_timestamp(&row.timestamp)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
        });
    }
    Ok(bars)
}

impl MarketDataSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        instrument: &str,
        granularity: Granularity,
        window: &Window,
    ) -> Result<OhlcSeries, DataError> {
        let path = self.path_for(instrument);
        if !path.exists() {
            return Err(DataError::UnknownInstrument {
                instrument: instrument.to_string(),
            });
        }
        let bars = load_bars(&path)?;
        tracing::debug!(instrument, path = %path.display(), rows = bars.len(), "loaded csv bars");
        Ok(OhlcSeries::new(
            instrument,
            granularity,
            select_window(bars, window),
        )?)
    }

    fn list_instruments(&self) -> Result<Vec<String>, DataError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
