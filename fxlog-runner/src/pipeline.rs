//! PipelineRunner: fetch → compute → normalize → write, once per instrument.
//!
//! Instruments run sequentially. A failure is recorded against its
//! instrument and the loop moves on; only universe discovery can fail a run.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

use fxlog_core::data::{DataError, MarketDataSource};
use fxlog_core::domain::{Granularity, Window};
use fxlog_core::indicators::IndicatorEngine;
use fxlog_core::store::{StoreBackend, StoreProvisioner, TradeLogWriter, WriteReceipt};
use fxlog_core::PipelineError;

use crate::config::{ConfigError, PipelineConfig};
use crate::report::{InstrumentFailure, InstrumentSuccess, RunReport};
use crate::universe::{resolve_universe, UniverseSelection};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("could not build data source: {0}")]
    Source(DataError),

    #[error("universe discovery failed: {0}")]
    Universe(DataError),
}

pub struct PipelineRunner {
    source: Arc<dyn MarketDataSource>,
    writer: TradeLogWriter,
    engine: IndicatorEngine,
    granularity: Granularity,
    window: Window,
}

impl PipelineRunner {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        writer: TradeLogWriter,
        granularity: Granularity,
        window: Window,
    ) -> Self {
        Self {
            source,
            writer,
            engine: IndicatorEngine::new(),
            granularity,
            window,
        }
    }

    /// Wire a runner from configuration with an explicit store backend.
    pub fn from_config(
        config: &PipelineConfig,
        store: Arc<dyn StoreBackend>,
    ) -> Result<Self, RunError> {
        config.validate()?;
        let source = config.build_source().map_err(RunError::Source)?;
        let provisioner =
            StoreProvisioner::new(store, config.table_naming(), config.retry_policy());
        Ok(Self::new(
            source,
            TradeLogWriter::new(provisioner),
            config.granularity(),
            config.window()?,
        ))
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn source(&self) -> &dyn MarketDataSource {
        self.source.as_ref()
    }

    /// Resolve the universe and process every instrument in it.
    pub fn run(&self, selection: &UniverseSelection) -> Result<RunReport, RunError> {
        let instruments =
            resolve_universe(self.source.as_ref(), selection).map_err(RunError::Universe)?;
        Ok(self.run_instruments(&instruments))
    }

    /// Process a fixed list of instruments. Never fails as a whole.
    pub fn run_instruments(&self, instruments: &[String]) -> RunReport {
        let mut report = RunReport::new(Utc::now(), self.granularity);
        tracing::info!(
            instruments = instruments.len(),
            granularity = %self.granularity,
            source = self.source.name(),
            "pipeline run started"
        );

        for instrument in instruments {
            let span = tracing::info_span!("instrument", instrument = %instrument);
            let _enter = span.enter();

            match self.process_instrument(instrument) {
                Ok(receipt) => report.succeeded.push(InstrumentSuccess {
                    instrument: instrument.clone(),
                    trade_id: receipt.trade_id,
                    table: receipt.table,
                    timestamp: receipt.timestamp,
                }),
                Err(e) => {
                    tracing::error!(kind = %e.kind(), error = %e, "instrument failed");
                    report.failed.push(InstrumentFailure {
                        instrument: instrument.clone(),
                        kind: e.kind(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.finished_at = Utc::now();
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "pipeline run finished"
        );
        report
    }

    /// One instrument, end to end.
    pub fn process_instrument(&self, instrument: &str) -> Result<WriteReceipt, PipelineError> {
        let series = self
            .source
            .fetch(instrument, self.granularity, &self.window)?;
        tracing::debug!(bars = series.len(), "fetched series");

        let indicators = self.engine.compute(&series)?;
        tracing::debug!(
            sma_20 = indicators.sma_20,
            rsi_14 = indicators.rsi_14,
            macd = indicators.macd,
            "computed indicators"
        );

        Ok(self.writer.write(instrument, self.granularity, &indicators)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use fxlog_core::data::StaticSource;
    use fxlog_core::domain::OhlcBar;
    use fxlog_core::store::{MemoryStore, RetryPolicy, TableNaming};
    use fxlog_core::ErrorKind;

    fn ramp(n: usize) -> Vec<OhlcBar> {
        let t0 = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 1.0 + i as f64 * 0.0001;
                OhlcBar {
                    timestamp: t0 + Duration::hours(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                }
            })
            .collect()
    }

    fn runner(source: StaticSource, store: Arc<MemoryStore>) -> PipelineRunner {
        PipelineRunner::new(
            Arc::new(source),
            TradeLogWriter::new(StoreProvisioner::new(
                store,
                TableNaming::default(),
                RetryPolicy::immediate(10),
            )),
            Granularity::H1,
            Window::Count(200),
        )
    }

    #[test]
    fn one_failure_does_not_stop_the_loop() {
        let source = StaticSource::new()
            .with_bars("AUD_USD", ramp(60))
            .with_bars("EUR_USD", ramp(10))
            .with_bars("GBP_USD", ramp(60));
        let store = Arc::new(MemoryStore::new());
        let report = runner(source, store.clone()).run(&UniverseSelection::All).unwrap();

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(
            report.failure_for("EUR_USD").unwrap().kind,
            ErrorKind::InsufficientHistory
        );
        assert_eq!(store.put_count("fx-trading-GBP_USD"), 1);
        assert_eq!(store.put_count("fx-trading-EUR_USD"), 0);
    }

    #[test]
    fn unknown_instrument_is_a_data_source_failure() {
        let store = Arc::new(MemoryStore::new());
        let report = runner(StaticSource::new(), store).run_instruments(&["XAU_USD".to_string()]);
        assert_eq!(report.failed[0].kind, ErrorKind::DataSource);
    }

    #[test]
    fn store_that_never_activates_is_a_provisioning_failure() {
        let source = StaticSource::new().with_bars("EUR_USD", ramp(60));
        let store = Arc::new(MemoryStore::new().with_creation_delay(1_000));
        let report = runner(source, store).run_instruments(&["EUR_USD".to_string()]);
        assert_eq!(report.failed[0].kind, ErrorKind::StoreProvisioning);
    }

    #[test]
    fn rejected_put_is_a_write_failure() {
        let source = StaticSource::new().with_bars("EUR_USD", ramp(60));
        let store = Arc::new(MemoryStore::new().rejecting_puts());
        let report = runner(source, store).run_instruments(&["EUR_USD".to_string()]);
        assert_eq!(report.failed[0].kind, ErrorKind::Write);
    }

    #[test]
    fn empty_universe_is_a_run_error() {
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            runner(StaticSource::new(), store).run(&UniverseSelection::All),
            Err(RunError::Universe(_))
        ));
    }
}
