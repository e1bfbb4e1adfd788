//! Per-instrument trade-log stores.
//!
//! A store is a durable keyed collection, one per instrument, named
//! `<prefix><instrument>` and keyed on a single string attribute (`TradeID`).
//! Backends create stores asynchronously: a freshly requested store is
//! observed as CREATING until the backend reports it ACTIVE. Nothing may be
//! written into a store that is not ACTIVE.

pub mod file;
pub mod memory;
pub mod provisioner;
pub mod writer;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use provisioner::{Backoff, ProvisionOutcome, ProvisioningError, RetryPolicy, StoreProvisioner};
pub use writer::{TradeLogWriter, WriteError, WriteReceipt};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::record::ATTR_TRADE_ID;
use crate::normalize::Item;

/// Store naming convention prefix.
pub const DEFAULT_TABLE_PREFIX: &str = "fx-trading-";

/// Provisioning state of a store, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    Absent,
    Creating,
    Active,
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "ABSENT",
            Self::Creating => "CREATING",
            Self::Active => "ACTIVE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    S,
    N,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    /// On-demand capacity; no provisioned throughput.
    PayPerRequest,
}

/// Creation request for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    /// The sole key attribute.
    pub key_attribute: String,
    pub key_type: AttributeType,
    pub billing_mode: BillingMode,
}

impl TableSpec {
    /// Single string key on `TradeID`, on-demand capacity.
    pub fn trade_log(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_attribute: ATTR_TRADE_ID.to_string(),
            key_type: AttributeType::S,
            billing_mode: BillingMode::PayPerRequest,
        }
    }
}

/// Deterministic instrument → store name mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNaming {
    prefix: String,
}

impl TableNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn table_for(&self, instrument: &str) -> String {
        format!("{}{instrument}", self.prefix)
    }
}

impl Default for TableNaming {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_PREFIX)
    }
}

/// Backend-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("table '{table}' is {status}, not ACTIVE")]
    NotActive { table: String, status: TableStatus },

    #[error("item is missing key attribute '{0}'")]
    MissingKey(String),

    #[error("request rejected by backend: {0}")]
    Rejected(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A durable keyed-collection backend.
///
/// Puts are unconditional: an item with an existing key replaces it.
pub trait StoreBackend: Send + Sync {
    /// Human-readable name of this backend.
    fn name(&self) -> &str;

    /// Current provisioning state of a store.
    fn describe_table(&self, table: &str) -> Result<TableStatus, StoreError>;

    /// Request creation. Returns once the request is accepted, not once ACTIVE.
    fn create_table(&self, spec: &TableSpec) -> Result<(), StoreError>;

    /// Write one item keyed by the table's key attribute.
    fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError>;

    fn get_item(&self, table: &str, key: &str) -> Result<Option<Item>, StoreError>;

    /// All items currently in the store, in key order.
    fn scan(&self, table: &str) -> Result<Vec<Item>, StoreError>;
}

/// Key value of an item for the given key attribute.
pub(crate) fn item_key(item: &Item, key_attribute: &str) -> Result<String, StoreError> {
    item.get(key_attribute)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| StoreError::MissingKey(key_attribute.to_string()))
}
