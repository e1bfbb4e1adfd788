//! Pipeline configuration: TOML file, then environment overlay, then CLI flags.
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use fxlog_core::data::{
    CsvSource, DataError, MarketDataSource, OandaSettings, OandaSource, SyntheticSource,
    PRACTICE_API_URL,
};
use fxlog_core::domain::{parse_timestamp, Granularity, Window};
use fxlog_core::indicators::MIN_BARS;
use fxlog_core::store::{
    Backoff, FileStore, MemoryStore, RetryPolicy, StoreBackend, TableNaming,
    DEFAULT_TABLE_PREFIX,
};

/// Instrument used when none is configured or the configured one is invalid.
pub const DEFAULT_INSTRUMENT: &str = "EUR_USD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field} '{value}': expected YYYY-MM-DDTHH:MM:SSZ or YYYY-MM-DD")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Single instrument to process.
    pub instrument: String,
    /// Process every instrument the source can list instead.
    pub all_instruments: bool,
    /// Granularity token or alias; resolved by [`PipelineConfig::granularity`].
    pub granularity: String,
    pub lookback: LookbackConfig,
    pub store: StoreConfig,
    pub provisioning: ProvisioningConfig,
    pub source: SourceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            instrument: DEFAULT_INSTRUMENT.to_string(),
            all_instruments: false,
            granularity: Granularity::default().as_str().to_string(),
            lookback: LookbackConfig::default(),
            store: StoreConfig::default(),
            provisioning: ProvisioningConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LookbackConfig {
    pub count: usize,
    /// Explicit range start; overrides `count` together with `end`.
    pub start: Option<String>,
    pub end: Option<String>,
}

impl Default for LookbackConfig {
    fn default() -> Self {
        Self {
            count: 200,
            start: None,
            end: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub root: PathBuf,
    pub table_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            root: PathBuf::from("fxlog-store"),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub backoff: BackoffKind,
    /// Cap for exponential backoff.
    pub max_interval_ms: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            max_attempts: 150,
            interval_ms: 2_000,
            backoff: BackoffKind::Fixed,
            max_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Oanda,
    Csv,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub oanda: OandaConfig,
    pub csv: CsvConfig,
    pub synthetic: SyntheticConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Oanda,
            oanda: OandaConfig::default(),
            csv: CsvConfig::default(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OandaConfig {
    pub api_url: String,
    pub account_id: String,
    /// Read from files and `OANDA_TOKEN`, never written back out.
    #[serde(skip_serializing)]
    pub token: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for OandaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OandaConfig")
            .field("api_url", &self.api_url)
            .field("account_id", &self.account_id)
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for OandaConfig {
    fn default() -> Self {
        Self {
            api_url: PRACTICE_API_URL.to_string(),
            account_id: String::new(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CsvConfig {
    pub dir: PathBuf,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SyntheticConfig {
    pub seed: u64,
}

impl PipelineConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Overlay environment variables read through `lookup`. Empty values are
    /// treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TRADE_INSTRUMENT") {
            self.instrument = v.trim().to_string();
        }
        if let Some(v) = get("GRANULARITY") {
            self.granularity = v.trim().to_string();
        }
        if let Some(v) = get("LOOKBACK_COUNT") {
            self.lookback.count = v.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("LOOKBACK_COUNT '{v}' is not a number"))
            })?;
        }
        if let Some(v) = get("FXLOG_STORE_DIR") {
            self.store.root = PathBuf::from(v);
            self.store.kind = StoreKind::File;
        }
        if let Some(v) = get("OANDA_ACCOUNT_ID") {
            self.source.oanda.account_id = v;
        }
        if let Some(v) = get("OANDA_TOKEN") {
            self.source.oanda.token = v;
        }
        if let Some(v) = get("OANDA_API_URL") {
            self.source.oanda.api_url = v;
        }
        Ok(())
    }

    /// Overlay the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookback.count < MIN_BARS {
            return Err(ConfigError::Invalid(format!(
                "lookback.count must be at least {MIN_BARS}, got {}",
                self.lookback.count
            )));
        }
        if self.provisioning.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "provisioning.max_attempts must be at least 1".into(),
            ));
        }
        if self.store.table_prefix.is_empty() {
            return Err(ConfigError::Invalid("store.table_prefix must not be empty".into()));
        }
        self.window()?;
        Ok(())
    }

    /// Resolved granularity; unparseable tokens fall back to the default.
    pub fn granularity(&self) -> Granularity {
        match self.granularity.parse::<Granularity>() {
            Ok(g) => g,
            Err(e) => {
                let fallback = Granularity::default();
                tracing::warn!(error = %e, fallback = %fallback, "invalid granularity, using default");
                fallback
            }
        }
    }

    /// Bars to request: the explicit range when both ends are set, else the count.
    pub fn window(&self) -> Result<Window, ConfigError> {
        match (&self.lookback.start, &self.lookback.end) {
            (None, None) => Ok(Window::Count(self.lookback.count)),
            (Some(start), Some(end)) => {
                let start_ts =
                    parse_timestamp(start).map_err(|_| ConfigError::InvalidTimestamp {
                        field: "lookback.start",
                        value: start.clone(),
                    })?;
                let end_ts = parse_timestamp(end).map_err(|_| ConfigError::InvalidTimestamp {
                    field: "lookback.end",
                    value: end.clone(),
                })?;
                if start_ts >= end_ts {
                    return Err(ConfigError::Invalid(format!(
                        "lookback.start ({start}) must be before lookback.end ({end})"
                    )));
                }
                Ok(Window::Range {
                    start: start_ts,
                    end: end_ts,
                })
            }
            _ => Err(ConfigError::Invalid(
                "lookback.start and lookback.end must be set together".into(),
            )),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let p = &self.provisioning;
        RetryPolicy {
            max_attempts: p.max_attempts,
            interval: Duration::from_millis(p.interval_ms),
            backoff: match p.backoff {
                BackoffKind::Fixed => Backoff::Fixed,
                BackoffKind::Exponential => Backoff::Exponential {
                    max_interval: Duration::from_millis(p.max_interval_ms),
                },
            },
        }
    }

    pub fn table_naming(&self) -> TableNaming {
        TableNaming::new(self.store.table_prefix.clone())
    }

    pub fn build_store(&self) -> Arc<dyn StoreBackend> {
        match self.store.kind {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::File => Arc::new(FileStore::new(self.store.root.clone())),
        }
    }

    pub fn build_source(&self) -> Result<Arc<dyn MarketDataSource>, DataError> {
        let source: Arc<dyn MarketDataSource> = match self.source.kind {
            SourceKind::Oanda => {
                let o = &self.source.oanda;
                Arc::new(OandaSource::new(OandaSettings {
                    api_url: o.api_url.clone(),
                    account_id: o.account_id.clone(),
                    token: o.token.clone(),
                    timeout: Duration::from_secs(o.timeout_secs),
                })?)
            }
            SourceKind::Csv => Arc::new(CsvSource::new(self.source.csv.dir.clone())),
            SourceKind::Synthetic => Arc::new(SyntheticSource::new(self.source.synthetic.seed)),
        };
        Ok(source)
    }
}
