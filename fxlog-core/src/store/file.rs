//! File-backed store backend with append-only item logs.
//!
//! Layout: `{root}/{table}/table.json` (descriptor) and
//! `{root}/{table}/items.jsonl` (one item per line).
//!
//! - Descriptor writes are atomic (write to .tmp, rename into place)
//! - `create_table` leaves the table CREATING; the first `describe_table`
//!   that finds the item log in place completes provisioning
//! - Puts append; on read the last line for a key wins

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{item_key, StoreBackend, StoreError, TableSpec, TableStatus};
use crate::normalize::Item;

const DESCRIPTOR_FILE: &str = "table.json";
const ITEMS_FILE: &str = "items.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Descriptor {
    spec: TableSpec,
    status: TableStatus,
    created_at: chrono::DateTime<chrono::Utc>,
}

pub struct FileStore {
    root: PathBuf,
    append_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of every table with a descriptor under the root.
    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().join(DESCRIPTOR_FILE).exists() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    fn descriptor_path(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(DESCRIPTOR_FILE)
    }

    fn items_path(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(ITEMS_FILE)
    }

    fn read_descriptor(&self, table: &str) -> Result<Option<Descriptor>, StoreError> {
        match fs::read_to_string(self.descriptor_path(table)) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_descriptor(&self, table: &str, descriptor: &Descriptor) -> Result<(), StoreError> {
        let path = self.descriptor_path(table);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(descriptor)?)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io(e)
        })
    }

    fn active_descriptor(&self, table: &str) -> Result<Descriptor, StoreError> {
        let descriptor = self
            .read_descriptor(table)?
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        if descriptor.status != TableStatus::Active {
            return Err(StoreError::NotActive {
                table: table.to_string(),
                status: descriptor.status,
            });
        }
        Ok(descriptor)
    }

    /// Items folded by key; later lines replace earlier ones.
    fn load_items(&self, table: &str) -> Result<BTreeMap<String, Item>, StoreError> {
        let descriptor = self
            .read_descriptor(table)?
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let path = self.items_path(table);
        let mut items = BTreeMap::new();
        if !path.exists() {
            return Ok(items);
        }
        let reader = io::BufReader::new(fs::File::open(&path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let item: Item = serde_json::from_str(&line)?;
            let key = item_key(&item, &descriptor.spec.key_attribute)?;
            items.insert(key, item);
        }
        Ok(items)
    }
}

impl StoreBackend for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn describe_table(&self, table: &str) -> Result<TableStatus, StoreError> {
        let Some(mut descriptor) = self.read_descriptor(table)? else {
            return Ok(TableStatus::Absent);
        };
        if descriptor.status == TableStatus::Creating && self.items_path(table).exists() {
            descriptor.status = TableStatus::Active;
            self.write_descriptor(table, &descriptor)?;
            tracing::debug!(table, "file store provisioning complete");
        }
        Ok(descriptor.status)
    }

    fn create_table(&self, spec: &TableSpec) -> Result<(), StoreError> {
        if self.read_descriptor(&spec.name)?.is_some() {
            return Err(StoreError::TableExists(spec.name.clone()));
        }
        fs::create_dir_all(self.table_dir(&spec.name))?;
        self.write_descriptor(
            &spec.name,
            &Descriptor {
                spec: spec.clone(),
                status: TableStatus::Creating,
                created_at: chrono::Utc::now(),
            },
        )?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.items_path(&spec.name))?;
        Ok(())
    }

    fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError> {
        let descriptor = self.active_descriptor(table)?;
        item_key(&item, &descriptor.spec.key_attribute)?;
        let line = serde_json::to_string(&item)?;

        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.items_path(table))?;
        writeln!(file, "{line}")?;
        file.sync_data()?;
        Ok(())
    }

    fn get_item(&self, table: &str, key: &str) -> Result<Option<Item>, StoreError> {
        Ok(self.load_items(table)?.remove(key))
    }

    fn scan(&self, table: &str) -> Result<Vec<Item>, StoreError> {
        Ok(self.load_items(table)?.into_values().collect())
    }
}
