//! End-to-end pipeline scenarios.
//!
//! 1. Linear ramp: indicators match hand-computed values, no error
//! 2. Absent store: ABSENT → CREATING → ACTIVE, then exactly one write
//! 3. Short history: that instrument fails, the others still succeed
//! 4. Repeated runs: distinct TradeIDs, distinct persisted records
//! 5. Constant closes: neutral indicators, stored without error

use chrono::{DateTime, Duration};
use proptest::prelude::*;
use std::sync::Arc;

use fxlog_core::data::StaticSource;
use fxlog_core::domain::{Granularity, OhlcBar, TradeRecord, Window};
use fxlog_core::store::{
    MemoryStore, RetryPolicy, StoreBackend, StoreProvisioner, TableNaming, TableStatus,
    TradeLogWriter,
};
use fxlog_core::ErrorKind;
use fxlog_runner::{PipelineConfig, PipelineRunner, UniverseSelection};

// ── Helpers ──────────────────────────────────────────────────────────

/// Hourly bars with closes 1.0000, 1.0001, ... 1.0000 + (n-1) * 0.0001.
fn ramp(n: usize) -> Vec<OhlcBar> {
    let t0 = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 1.0 + i as f64 * 0.0001;
            let open = if i == 0 { close } else { close - 0.0001 };
            OhlcBar {
                timestamp: t0 + Duration::hours(i as i64),
                open,
                high: close + 0.00005,
                low: open - 0.00005,
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
            RetryPolicy::immediate(20),
        )),
        Granularity::H1,
        Window::Count(200),
    )
}

fn stored_record(store: &MemoryStore, table: &str) -> TradeRecord {
    let items = store.scan(table).unwrap();
    assert_eq!(items.len(), 1);
    TradeRecord::from_item(&items[0]).unwrap()
}

// ── 1. Linear ramp ───────────────────────────────────────────────────

#[test]
fn linear_ramp_produces_expected_indicators() {
    let store = Arc::new(MemoryStore::new());
    let report = runner(StaticSource::new().with_bars("EUR_USD", ramp(60)), store.clone())
        .run(&UniverseSelection::Single("EUR_USD".into()))
        .unwrap();
    assert!(report.is_clean(), "{}", report.summary());

    let record = stored_record(&store, "fx-trading-EUR_USD");
    let expected_sma20 = (1.0059 + 1.0040) / 2.0;
    assert!((record.indicators.sma_20 - expected_sma20).abs() < 1e-9);
    assert!(record.indicators.rsi_14 > 50.0);
    assert_eq!(record.instrument, "EUR_USD");
    assert_eq!(record.granularity, Granularity::H1);
}

// ── 2. Absent store ──────────────────────────────────────────────────

#[test]
fn absent_store_is_provisioned_then_written_once() {
    let store = Arc::new(MemoryStore::new().with_creation_delay(3));
    let report = runner(StaticSource::new().with_bars("EUR_USD", ramp(60)), store.clone())
        .run_instruments(&["EUR_USD".to_string()]);
    assert!(report.is_clean(), "{}", report.summary());

    let observed = store.observed_statuses("fx-trading-EUR_USD");
    assert_eq!(observed.first(), Some(&TableStatus::Absent));
    assert!(observed.contains(&TableStatus::Creating));
    // The writer re-checks before the put, so the last two observations are ACTIVE.
    assert_eq!(&observed[observed.len() - 2..], &[TableStatus::Active, TableStatus::Active]);
    let first_active = observed.iter().position(|s| *s == TableStatus::Active).unwrap();
    assert!(observed[..first_active].iter().all(|s| *s != TableStatus::Active));

    assert_eq!(store.put_count("fx-trading-EUR_USD"), 1);
}

// ── 3. Short history ─────────────────────────────────────────────────

#[test]
fn short_history_fails_only_that_instrument() {
    let source = StaticSource::new()
        .with_bars("EUR_USD", ramp(10))
        .with_bars("USD_JPY", ramp(60));
    let store = Arc::new(MemoryStore::new());
    let report = runner(source, store.clone())
        .run(&UniverseSelection::All)
        .unwrap();

    let failure = report.failure_for("EUR_USD").unwrap();
    assert_eq!(failure.kind, ErrorKind::InsufficientHistory);
    assert!(failure.reason.contains("10 bars available"));
    assert!(report.success_for("USD_JPY").is_some());
    assert_eq!(store.put_count("fx-trading-USD_JPY"), 1);
    assert!(!store.table_names().contains(&"fx-trading-EUR_USD".to_string()));
}

// ── 4. Repeated runs ─────────────────────────────────────────────────

#[test]
fn sequential_runs_append_distinct_records() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner(StaticSource::new().with_bars("EUR_USD", ramp(60)), store.clone());
    let first = runner.run_instruments(&["EUR_USD".to_string()]);
    let second = runner.run_instruments(&["EUR_USD".to_string()]);

    let a = &first.succeeded[0].trade_id;
    let b = &second.succeeded[0].trade_id;
    assert_ne!(a, b);
    assert_eq!(store.scan("fx-trading-EUR_USD").unwrap().len(), 2);
    assert!(store.get_item("fx-trading-EUR_USD", a.as_str()).unwrap().is_some());
    assert!(store.get_item("fx-trading-EUR_USD", b.as_str()).unwrap().is_some());
}

// ── Configured end to end ────────────────────────────────────────────

#[test]
fn csv_source_into_file_store_from_config() {
    let data = tempfile::tempdir().unwrap();
    let mut csv = String::from("timestamp,open,high,low,close\n");
    for bar in ramp(80) {
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            bar.timestamp.timestamp(),
            bar.open,
            bar.high,
            bar.low,
            bar.close
        ));
    }
    std::fs::write(data.path().join("EUR_USD.csv"), csv).unwrap();
    let store_dir = tempfile::tempdir().unwrap();

    let config = PipelineConfig::from_toml(&format!(
        r#"
        granularity = "1hr"

        [lookback]
        count = 60

        [store]
        kind = "file"
        root = "{}"

        [provisioning]
        max_attempts = 3
        interval_ms = 0

        [source]
        kind = "csv"
        csv = {{ dir = "{}" }}
        "#,
        store_dir.path().display().to_string().replace('\\', "/"),
        data.path().display().to_string().replace('\\', "/"),
    ))
    .unwrap();

    let store = config.build_store();
    let runner = PipelineRunner::from_config(&config, store.clone()).unwrap();
    let report = runner
        .run(&UniverseSelection::Single(config.instrument.clone()))
        .unwrap();
    assert!(report.is_clean(), "{}", report.summary());

    let items = store.scan("fx-trading-EUR_USD").unwrap();
    assert_eq!(items.len(), 1);
    let record = TradeRecord::from_item(&items[0]).unwrap();
    // 60-bar window over 80 bars: last close 1.0079, SMA(20) over 1.0060..=1.0079.
    assert!((record.indicators.sma_20 - (1.0079 + 1.0060) / 2.0).abs() < 1e-9);
    assert!(store_dir.path().join("fx-trading-EUR_USD/items.jsonl").exists());
}

// ── 5. Constant closes ───────────────────────────────────────────────

fn flat(n: usize, close: f64) -> Vec<OhlcBar> {
    let t0 = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
    (0..n)
        .map(|i| OhlcBar {
            timestamp: t0 + Duration::hours(i as i64),
            open: close,
            high: close,
            low: close,
            close,
        })
        .collect()
}

fn assert_flat_record(record: &TradeRecord, close: f64) {
    let ind = &record.indicators;
    assert!((ind.sma_20 - close).abs() < 1e-9, "sma_20 {}", ind.sma_20);
    assert!((ind.sma_50 - close).abs() < 1e-9, "sma_50 {}", ind.sma_50);
    assert!((ind.ema_20 - close).abs() < 1e-9, "ema_20 {}", ind.ema_20);
    assert_eq!(ind.rsi_14, 50.0);
    assert!(ind.macd.abs() < 1e-9, "macd {}", ind.macd);
    assert!(ind.macd_signal.abs() < 1e-9, "macd_signal {}", ind.macd_signal);
    assert!((ind.bb_upper - close).abs() < 1e-9, "bb_upper {}", ind.bb_upper);
    assert!((ind.bb_lower - close).abs() < 1e-9, "bb_lower {}", ind.bb_lower);
}

#[test]
fn constant_closes_are_stored_across_price_levels() {
    // Levels whose EMAs leave float residue in MACD.
    for k in 0..200 {
        let close = 1.0 + k as f64 * 0.0137;
        let store = Arc::new(MemoryStore::new());
        let source = StaticSource::new().with_bars("EUR_USD", flat(60, close));
        let report = runner(source, store.clone()).run_instruments(&["EUR_USD".to_string()]);
        assert!(report.is_clean(), "close {close}: {}", report.summary());
        assert_flat_record(&stored_record(&store, "fx-trading-EUR_USD"), close);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_constant_close_runs_clean(close in 0.0001..500.0_f64, len in 50usize..120) {
        let store = Arc::new(MemoryStore::new());
        let source = StaticSource::new().with_bars("EUR_USD", flat(len, close));
        let report = runner(source, store.clone()).run_instruments(&["EUR_USD".to_string()]);
        prop_assert!(report.is_clean(), "{}", report.summary());
        prop_assert_eq!(store.put_count("fx-trading-EUR_USD"), 1);
        let record = stored_record(&store, "fx-trading-EUR_USD");
        prop_assert_eq!(record.indicators.rsi_14, 50.0);
        prop_assert!((record.indicators.sma_50 - close).abs() <= close * 1e-12);
    }
}
