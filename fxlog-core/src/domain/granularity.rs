//! Sampling granularity and request windows.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Timestamp shape accepted by market-data collaborators: UTC, second precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Fixed time-bucket size of each bar (OANDA candle granularity tokens).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Granularity {
    S5,
    S10,
    S15,
    S30,
    M1,
    M2,
    M4,
    M5,
    M10,
    M15,
    M30,
    H1,
    H2,
    H3,
    H4,
    H6,
    H8,
    H12,
    D,
    W,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown granularity '{0}'")]
pub struct GranularityError(pub String);

impl Granularity {
    pub const ALL: [Granularity; 21] = [
        Self::S5,
        Self::S10,
        Self::S15,
        Self::S30,
        Self::M1,
        Self::M2,
        Self::M4,
        Self::M5,
        Self::M10,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H2,
        Self::H3,
        Self::H4,
        Self::H6,
        Self::H8,
        Self::H12,
        Self::D,
        Self::W,
        Self::Month,
    ];

    /// Wire token, e.g. `"M5"`, `"H1"`, `"D"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S5 => "S5",
            Self::S10 => "S10",
            Self::S15 => "S15",
            Self::S30 => "S30",
            Self::M1 => "M1",
            Self::M2 => "M2",
            Self::M4 => "M4",
            Self::M5 => "M5",
            Self::M10 => "M10",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H2 => "H2",
            Self::H3 => "H3",
            Self::H4 => "H4",
            Self::H6 => "H6",
            Self::H8 => "H8",
            Self::H12 => "H12",
            Self::D => "D",
            Self::W => "W",
            Self::Month => "M",
        }
    }

    /// Nominal bucket length in seconds. Months are taken as 30 days.
    pub fn seconds(&self) -> i64 {
        match self {
            Self::S5 => 5,
            Self::S10 => 10,
            Self::S15 => 15,
            Self::S30 => 30,
            Self::M1 => 60,
            Self::M2 => 120,
            Self::M4 => 240,
            Self::M5 => 300,
            Self::M10 => 600,
            Self::M15 => 900,
            Self::M30 => 1_800,
            Self::H1 => 3_600,
            Self::H2 => 7_200,
            Self::H3 => 10_800,
            Self::H4 => 14_400,
            Self::H6 => 21_600,
            Self::H8 => 28_800,
            Self::H12 => 43_200,
            Self::D => 86_400,
            Self::W => 604_800,
            Self::Month => 2_592_000,
        }
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Self::H1
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = GranularityError;

    /// Accepts the wire tokens plus the loose shorthands operators tend to type
    /// (`30s`, `1m`, `1hr`, `1d`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(g) = Self::ALL.iter().find(|g| g.as_str() == trimmed) {
            return Ok(*g);
        }
        let alias = match trimmed.to_ascii_lowercase().as_str() {
            "5s" => Self::S5,
            "10s" => Self::S10,
            "15s" => Self::S15,
            "30s" => Self::S30,
            "1m" | "1min" => Self::M1,
            "2m" => Self::M2,
            "4m" => Self::M4,
            "5m" | "5min" => Self::M5,
            "10m" => Self::M10,
            "15m" | "15min" => Self::M15,
            "30m" | "30min" => Self::M30,
            "1h" | "1hr" => Self::H1,
            "2h" | "2hr" => Self::H2,
            "3h" | "3hr" => Self::H3,
            "4h" | "4hr" => Self::H4,
            "6h" | "6hr" => Self::H6,
            "8h" | "8hr" => Self::H8,
            "12h" | "12hr" => Self::H12,
            "1d" | "d" | "day" => Self::D,
            "1w" | "w" | "week" => Self::W,
            "1mo" | "month" => Self::Month,
            _ => return Err(GranularityError(s.to_string())),
        };
        Ok(alias)
    }
}

impl TryFrom<String> for Granularity {
    type Error = GranularityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Granularity> for String {
    fn from(value: Granularity) -> Self {
        value.as_str().to_string()
    }
}

/// Which bars to request: the most recent `n`, or an explicit UTC range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Window {
    Count(usize),
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Render a timestamp in the collaborator's exact input shape.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse `YYYY-MM-DDTHH:MM:SSZ`, or a bare `YYYY-MM-DD` taken as midnight UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let s = s.trim();
    if s.len() == 10 {
        let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map(|dt| dt.and_utc())
}
