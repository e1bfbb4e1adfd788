use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Identity of one persisted trade-log record; the store's sole key attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(pub String);

impl TradeId {
    /// Generate a fresh id: `<unix millis>-<process sequence>-<random>`.
    ///
    /// The millisecond prefix keeps ids roughly time-sortable, the sequence
    /// separates writes inside one process and millisecond, and the random
    /// suffix separates concurrent processes.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let salt: u32 = rand::random();
        Self(format!("{}-{seq:06}-{salt:08x}", now.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
