//! Run report: which instruments succeeded, which failed and why.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use fxlog_core::domain::{Granularity, TradeId};
use fxlog_core::ErrorKind;

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSuccess {
    pub instrument: String,
    pub trade_id: TradeId,
    pub table: String,
    /// Epoch seconds stamped on the record.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentFailure {
    pub instrument: String,
    pub kind: ErrorKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub granularity: Granularity,
    pub succeeded: Vec<InstrumentSuccess>,
    pub failed: Vec<InstrumentFailure>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, granularity: Granularity) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            started_at,
            finished_at: started_at,
            granularity,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Every instrument succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failure_for(&self, instrument: &str) -> Option<&InstrumentFailure> {
        self.failed.iter().find(|f| f.instrument == instrument)
    }

    pub fn success_for(&self, instrument: &str) -> Option<&InstrumentSuccess> {
        self.succeeded.iter().find(|s| s.instrument == instrument)
    }

    /// One line per instrument, successes first.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} instruments, {} succeeded, {} failed ({})\n",
            self.total(),
            self.succeeded.len(),
            self.failed.len(),
            self.granularity
        );
        for s in &self.succeeded {
            out.push_str(&format!("  ok    {:<12} {} -> {}\n", s.instrument, s.trade_id, s.table));
        }
        for f in &self.failed {
            out.push_str(&format!("  FAIL  {:<12} [{}] {}\n", f.instrument, f.kind, f.reason));
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the report as pretty JSON, atomically.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            e
        })
    }
}
