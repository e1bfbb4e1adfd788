//! TradeLogWriter: one durable, unconditional put per call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::provisioner::{ProvisioningError, StoreProvisioner};
use super::{StoreError, TableStatus};
use crate::domain::{Granularity, IndicatorSet, TradeId, TradeRecord};
use crate::normalize::NormalizationError;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error("table '{table}' was {status} at write time")]
    StoreNotActive { table: String, status: TableStatus },

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error("put into '{table}' failed: {source}")]
    Put {
        table: String,
        #[source]
        source: StoreError,
    },
}

/// What a successful write persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub trade_id: TradeId,
    pub table: String,
    /// Epoch seconds stamped on the record.
    pub timestamp: i64,
}

pub struct TradeLogWriter {
    provisioner: StoreProvisioner,
}

impl TradeLogWriter {
    pub fn new(provisioner: StoreProvisioner) -> Self {
        Self { provisioner }
    }

    pub fn provisioner(&self) -> &StoreProvisioner {
        &self.provisioner
    }

    /// Write the indicator set for an instrument, stamped with the current time.
    pub fn write(
        &self,
        instrument: &str,
        granularity: Granularity,
        indicators: &IndicatorSet,
    ) -> Result<WriteReceipt, WriteError> {
        self.write_at(instrument, granularity, indicators, Utc::now())
    }

    /// As [`write`](Self::write) with an explicit record time.
    pub fn write_at(
        &self,
        instrument: &str,
        granularity: Granularity,
        indicators: &IndicatorSet,
        now: DateTime<Utc>,
    ) -> Result<WriteReceipt, WriteError> {
        let record = TradeRecord {
            trade_id: TradeId::generate(now),
            instrument: instrument.to_string(),
            granularity,
            timestamp: now.timestamp(),
            indicators: *indicators,
        };
        let item = record.to_item()?;

        self.provisioner.ensure_ready(instrument)?;

        let table = self.provisioner.table_for(instrument);
        let backend = self.provisioner.backend();
        let status = backend
            .describe_table(&table)
            .map_err(|source| ProvisioningError::Backend {
                table: table.clone(),
                source,
            })?;
        if status != TableStatus::Active {
            tracing::error!(table = %table, status = %status, "store left ACTIVE before write");
            return Err(WriteError::StoreNotActive { table, status });
        }

        backend.put_item(&table, item).map_err(|source| WriteError::Put {
            table: table.clone(),
            source,
        })?;

        tracing::info!(
            instrument,
            table = %table,
            trade_id = %record.trade_id,
            "trade record written"
        );
        Ok(WriteReceipt {
            trade_id: record.trade_id,
            table,
            timestamp: record.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, RetryPolicy, StoreBackend, TableNaming};
    use std::sync::Arc;

    fn indicators() -> IndicatorSet {
        IndicatorSet {
            sma_20: 1.00495,
            sma_50: 1.00345,
            ema_20: 1.00495,
            rsi_14: 100.0,
            macd: 0.0007,
            macd_signal: 0.0007,
            bb_upper: 1.0061,
            bb_lower: 1.0038,
        }
    }

    fn writer(store: Arc<MemoryStore>) -> TradeLogWriter {
        TradeLogWriter::new(StoreProvisioner::new(
            store,
            TableNaming::default(),
            RetryPolicy::immediate(10),
        ))
    }

    #[test]
    fn first_write_provisions_then_puts_once() {
        let store = Arc::new(MemoryStore::new().with_creation_delay(1));
        let receipt = writer(store.clone())
            .write("EUR_USD", Granularity::H1, &indicators())
            .unwrap();

        assert_eq!(receipt.table, "fx-trading-EUR_USD");
        assert_eq!(store.put_count("fx-trading-EUR_USD"), 1);
        let item = store
            .get_item("fx-trading-EUR_USD", receipt.trade_id.as_str())
            .unwrap()
            .unwrap();
        let decoded = TradeRecord::from_item(&item).unwrap();
        assert_eq!(decoded.instrument, "EUR_USD");
        assert_eq!(decoded.indicators, indicators());
        assert_eq!(decoded.timestamp, receipt.timestamp);
    }

    #[test]
    fn two_writes_are_two_records() {
        let store = Arc::new(MemoryStore::new());
        let w = writer(store.clone());
        let a = w.write("EUR_USD", Granularity::H1, &indicators()).unwrap();
        let b = w.write("EUR_USD", Granularity::H1, &indicators()).unwrap();
        assert_ne!(a.trade_id, b.trade_id);
        assert_eq!(store.scan("fx-trading-EUR_USD").unwrap().len(), 2);
    }

    #[test]
    fn non_finite_indicator_fails_before_provisioning() {
        let store = Arc::new(MemoryStore::new());
        let mut bad = indicators();
        bad.rsi_14 = f64::INFINITY;
        let err = writer(store.clone())
            .write("EUR_USD", Granularity::H1, &bad)
            .unwrap_err();
        assert!(matches!(err, WriteError::Normalization(_)));
        assert_eq!(store.put_count("fx-trading-EUR_USD"), 0);
        assert_eq!(
            store.describe_table("fx-trading-EUR_USD").unwrap(),
            TableStatus::Absent
        );
    }

    #[test]
    fn tiny_float_residue_is_written() {
        let store = Arc::new(MemoryStore::new());
        let mut flat = indicators();
        flat.macd = -2.220446049250313e-16;
        flat.macd_signal = 1.1102230246251565e-16;
        let receipt = writer(store.clone())
            .write("EUR_USD", Granularity::H1, &flat)
            .unwrap();
        let item = store
            .get_item("fx-trading-EUR_USD", receipt.trade_id.as_str())
            .unwrap()
            .unwrap();
        let decoded = TradeRecord::from_item(&item).unwrap();
        assert!(decoded.indicators.macd.abs() < 1e-15);
        assert!(decoded.indicators.macd_signal.abs() < 1e-15);
    }

    #[test]
    fn rejected_put_surfaces_unchanged() {
        let store = Arc::new(MemoryStore::new().rejecting_puts());
        let err = writer(store)
            .write("EUR_USD", Granularity::H1, &indicators())
            .unwrap_err();
        match err {
            WriteError::Put { table, source } => {
                assert_eq!(table, "fx-trading-EUR_USD");
                assert!(matches!(source, StoreError::Rejected(_)));
            }
            other => panic!("expected Put error, got {other:?}"),
        }
    }

    #[test]
    fn record_time_comes_from_the_writer() {
        let store = Arc::new(MemoryStore::new());
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let receipt = writer(store)
            .write_at("EUR_USD", Granularity::M15, &indicators(), now)
            .unwrap();
        assert_eq!(receipt.timestamp, 1_700_000_000);
        assert!(receipt.trade_id.as_str().starts_with("1700000000000-"));
    }
}
