//! fxlog CLI: run the trade-telemetry pipeline and inspect what it stored.
//!
//! Commands:
//! - `run`: fetch, compute indicators and write one record per instrument
//! - `instruments`: list what the configured data source can serve
//! - `records`: print the records in a file-backed store for one instrument
//! - `config`: print the effective configuration as TOML

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use fxlog_core::domain::{format_timestamp, TradeRecord};
use fxlog_core::store::{FileStore, StoreBackend};
use fxlog_runner::{
    PipelineConfig, PipelineRunner, SourceKind, StoreKind, UniverseSelection,
};

const DEFAULT_CONFIG_FILE: &str = "fxlog.toml";

#[derive(Parser)]
#[command(
    name = "fxlog",
    version,
    about = "fxlog: FX indicator telemetry into per-instrument trade-log stores"
)]
struct Cli {
    /// Path to a TOML config file. Defaults to ./fxlog.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. info, debug, fxlog_core=trace). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Oanda,
    Csv,
    Synthetic,
}

impl From<SourceArg> for SourceKind {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Oanda => SourceKind::Oanda,
            SourceArg::Csv => SourceKind::Csv,
            SourceArg::Synthetic => SourceKind::Synthetic,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once.
    Run {
        /// Instrument to process (e.g. EUR_USD).
        #[arg(long)]
        instrument: Option<String>,

        /// Process every instrument the data source lists.
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Granularity token or alias (H1, M15, 1hr, 1d, ...).
        #[arg(long)]
        granularity: Option<String>,

        /// Number of most recent bars to fetch.
        #[arg(long)]
        count: Option<usize>,

        /// Range start (YYYY-MM-DDTHH:MM:SSZ or YYYY-MM-DD). Requires --end.
        #[arg(long)]
        start: Option<String>,

        /// Range end. Requires --start.
        #[arg(long)]
        end: Option<String>,

        /// Market data source.
        #[arg(long, value_enum)]
        source: Option<SourceArg>,

        /// Write records to a file-backed store rooted here.
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Write the run report as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// List instruments the configured data source can serve.
    Instruments {
        #[arg(long, value_enum)]
        source: Option<SourceArg>,
    },
    /// Print the records stored for one instrument in a file-backed store.
    Records {
        #[arg(long)]
        instrument: Option<String>,

        /// Store root. Defaults to the configured store.root.
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Print raw JSON lines instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the effective configuration (file + environment) as TOML.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            instrument,
            all,
            granularity,
            count,
            start,
            end,
            source,
            store_dir,
            report,
        } => {
            if all && instrument.is_some() {
                bail!("--all and --instrument are mutually exclusive");
            }
            if start.is_some() != end.is_some() {
                bail!("--start and --end must be given together");
            }
            if let Some(i) = instrument {
                config.instrument = i;
            }
            config.all_instruments |= all;
            if let Some(g) = granularity {
                config.granularity = g;
            }
            if let Some(c) = count {
                config.lookback.count = c;
            }
            if start.is_some() {
                config.lookback.start = start;
                config.lookback.end = end;
            }
            if let Some(s) = source {
                config.source.kind = s.into();
            }
            if let Some(dir) = store_dir {
                config.store.kind = StoreKind::File;
                config.store.root = dir;
            }
            run_pipeline(&config, report.as_deref())
        }
        Commands::Instruments { source } => {
            if let Some(s) = source {
                config.source.kind = s.into();
            }
            list_instruments(&config)
        }
        Commands::Records {
            instrument,
            store_dir,
            json,
        } => {
            let instrument = instrument.unwrap_or_else(|| config.instrument.clone());
            let root = store_dir.unwrap_or_else(|| config.store.root.clone());
            show_records(&config, &root, &instrument, json)
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// File (explicit, or ./fxlog.toml if present), then environment.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(p) => PipelineConfig::from_file(p)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            PipelineConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => PipelineConfig::default(),
    };
    config.apply_process_env()?;
    Ok(config)
}

fn run_pipeline(config: &PipelineConfig, report_path: Option<&Path>) -> Result<()> {
    let store = config.build_store();
    if config.store.kind == StoreKind::Memory {
        tracing::warn!("using the in-memory store; records will not outlive this process");
    }
    let runner = PipelineRunner::from_config(config, store)?;

    let selection = if config.all_instruments {
        UniverseSelection::All
    } else {
        UniverseSelection::Single(config.instrument.clone())
    };
    let report = runner.run(&selection)?;

    print!("{}", report.summary());
    if let Some(path) = report_path {
        report
            .write_json(path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    if !report.succeeded.is_empty() || report.failed.is_empty() {
        Ok(())
    } else {
        bail!("all {} instruments failed", report.failed.len())
    }
}

fn list_instruments(config: &PipelineConfig) -> Result<()> {
    let source = config.build_source()?;
    let instruments = source
        .list_instruments()
        .with_context(|| format!("failed to list instruments from {}", source.name()))?;
    for instrument in &instruments {
        println!("{instrument}");
    }
    tracing::info!(count = instruments.len(), source = source.name(), "listed instruments");
    Ok(())
}

fn show_records(config: &PipelineConfig, root: &Path, instrument: &str, json: bool) -> Result<()> {
    let store = FileStore::new(root);
    let table = config.table_naming().table_for(instrument);
    let items = store
        .scan(&table)
        .with_context(|| format!("failed to read {table} under {}", root.display()))?;

    if items.is_empty() {
        println!("No records in {table}.");
        return Ok(());
    }

    let mut records = Vec::with_capacity(items.len());
    for item in &items {
        if json {
            println!("{}", serde_json::to_string(item)?);
            continue;
        }
        records.push(TradeRecord::from_item(item).with_context(|| format!("bad item in {table}"))?);
    }
    if json {
        return Ok(());
    }

    records.sort_by_key(|r| r.timestamp);
    println!(
        "{:<34} {:<20} {:>4} {:>10} {:>10} {:>7} {:>10} {:>10}",
        "TradeID", "Time", "Gran", "SMA_20", "EMA_20", "RSI_14", "MACD", "BB_Upper"
    );
    for r in &records {
        let when = DateTime::from_timestamp(r.timestamp, 0)
            .map(format_timestamp)
            .unwrap_or_else(|| r.timestamp.to_string());
        println!(
            "{:<34} {:<20} {:>4} {:>10.5} {:>10.5} {:>7.2} {:>10.6} {:>10.5}",
            r.trade_id.as_str(),
            when,
            r.granularity.as_str(),
            r.indicators.sma_20,
            r.indicators.ema_20,
            r.indicators.rsi_14,
            r.indicators.macd,
            r.indicators.bb_upper
        );
    }
    println!("{} records in {table}", records.len());
    Ok(())
}
