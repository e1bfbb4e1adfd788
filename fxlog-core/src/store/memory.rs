//! In-process store backend.
//!
//! Models asynchronous provisioning: a new table reports CREATING for a
//! configurable number of `describe_table` observations before it turns
//! ACTIVE. Fault injection covers rejected creates and puts.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{item_key, StoreBackend, StoreError, TableSpec, TableStatus};
use crate::normalize::Item;

#[derive(Debug)]
struct MemTable {
    spec: TableSpec,
    status: TableStatus,
    /// Observations left before CREATING flips to ACTIVE.
    pending_polls: u32,
    items: BTreeMap<String, Item>,
    puts: usize,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, MemTable>,
    observed: HashMap<String, Vec<TableStatus>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    creation_delay: u32,
    reject_create: bool,
    reject_put: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// New tables stay CREATING for `polls` describe calls.
    pub fn with_creation_delay(mut self, polls: u32) -> Self {
        self.creation_delay = polls;
        self
    }

    pub fn rejecting_creates(mut self) -> Self {
        self.reject_create = true;
        self
    }

    pub fn rejecting_puts(mut self) -> Self {
        self.reject_put = true;
        self
    }

    /// Seed an already-ACTIVE table.
    pub fn with_active_table(self, spec: TableSpec) -> Self {
        self.lock().tables.insert(
            spec.name.clone(),
            MemTable {
                spec,
                status: TableStatus::Active,
                pending_polls: 0,
                items: BTreeMap::new(),
                puts: 0,
            },
        );
        self
    }

    /// Every status `describe_table` has reported for a table, in order.
    pub fn observed_statuses(&self, table: &str) -> Vec<TableStatus> {
        self.lock().observed.get(table).cloned().unwrap_or_default()
    }

    /// Number of accepted puts into a table.
    pub fn put_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.puts)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StoreBackend for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn describe_table(&self, table: &str) -> Result<TableStatus, StoreError> {
        let mut state = self.lock();
        let status = match state.tables.get_mut(table) {
            None => TableStatus::Absent,
            Some(t) => {
                if t.status == TableStatus::Creating {
                    if t.pending_polls == 0 {
                        t.status = TableStatus::Active;
                    } else {
                        t.pending_polls -= 1;
                    }
                }
                t.status
            }
        };
        state
            .observed
            .entry(table.to_string())
            .or_default()
            .push(status);
        Ok(status)
    }

    fn create_table(&self, spec: &TableSpec) -> Result<(), StoreError> {
        if self.reject_create {
            return Err(StoreError::Rejected(format!(
                "create of '{}' refused",
                spec.name
            )));
        }
        let mut state = self.lock();
        if state.tables.contains_key(&spec.name) {
            return Err(StoreError::TableExists(spec.name.clone()));
        }
        state.tables.insert(
            spec.name.clone(),
            MemTable {
                spec: spec.clone(),
                status: TableStatus::Creating,
                pending_polls: self.creation_delay,
                items: BTreeMap::new(),
                puts: 0,
            },
        );
        Ok(())
    }

    fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError> {
        if self.reject_put {
            return Err(StoreError::Rejected(format!("put into '{table}' refused")));
        }
        let mut state = self.lock();
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        if t.status != TableStatus::Active {
            return Err(StoreError::NotActive {
                table: table.to_string(),
                status: t.status,
            });
        }
        let key = item_key(&item, &t.spec.key_attribute)?;
        t.items.insert(key, item);
        t.puts += 1;
        Ok(())
    }

    fn get_item(&self, table: &str, key: &str) -> Result<Option<Item>, StoreError> {
        let state = self.lock();
        let t = state
            .tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.items.get(key).cloned())
    }

    fn scan(&self, table: &str) -> Result<Vec<Item>, StoreError> {
        let state = self.lock();
        let t = state
            .tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.items.values().cloned().collect())
    }
}
