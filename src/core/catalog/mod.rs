//! Table name → key schema map (spec §2 component 9, §3 "Table catalog entry").
//!
//! Persisted as one JSON file under `DATA_DIR`, the way the host codebase's
//! `Config` loader treats its own config file: load-on-open, rewrite-whole-
//! file-on-change. Read-mostly and cached in memory behind an `RwLock`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::core::common::error::StoreError;
use crate::core::common::value::ScalarType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyAttribute {
    pub name: String,
    pub scalar_type: ScalarType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub table_name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
    pub created_at: String,
}

#[derive(Default, Serialize, Deserialize)]
struct CatalogFile {
    tables: BTreeMap<String, TableSchema>,
}

pub struct TableCatalog {
    path: PathBuf,
    tables: RwLock<BTreeMap<String, TableSchema>>,
}

impl TableCatalog {
    /// Loads the catalog from `path`, or starts empty if it does not exist
    /// yet.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] or [`StoreError::Serialization`] if the
    /// file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let tables = match std::fs::read(&path) {
            Ok(bytes) => {
                let file: CatalogFile = serde_json::from_slice(&bytes)?;
                file.tables
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, tables: RwLock::new(tables) })
    }

    fn persist(&self, tables: &BTreeMap<String, TableSchema>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = CatalogFile { tables: tables.clone() };
        let bytes = serde_json::to_vec_pretty(&file)?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, bytes)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Registers a new table.
    ///
    /// # Errors
    /// Returns [`StoreError::ResourceInUse`] if a table with this name
    /// already exists.
    pub fn create_table(&self, schema: TableSchema) -> Result<(), StoreError> {
        let mut guard = self.tables.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.contains_key(&schema.table_name) {
            return Err(StoreError::ResourceInUse(format!("table {} already exists", schema.table_name)));
        }
        guard.insert(schema.table_name.clone(), schema);
        self.persist(&guard)
    }

    /// Removes a table's schema entry (row deletion across shards is the
    /// caller's responsibility).
    ///
    /// # Errors
    /// Returns [`StoreError::ResourceNotFound`] if no such table exists.
    pub fn delete_table(&self, table_name: &str) -> Result<TableSchema, StoreError> {
        let mut guard = self.tables.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let schema = guard
            .remove(table_name)
            .ok_or_else(|| StoreError::ResourceNotFound(format!("table {table_name} not found")))?;
        self.persist(&guard)?;
        Ok(schema)
    }

    #[must_use]
    pub fn describe_table(&self, table_name: &str) -> Option<TableSchema> {
        self.tables.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(table_name).cloned()
    }

    #[must_use]
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.read().unwrap_or_else(std::sync::PoisonError::into_inner).keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn schema(name: &str) -> TableSchema {
        TableSchema {
            table_name: name.into(),
            partition_key: KeyAttribute { name: "id".into(), scalar_type: ScalarType::String },
            sort_key: None,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn create_then_describe_round_trips() {
        let dir = tempdir().unwrap();
        let catalog = TableCatalog::open(dir.path().join("catalog.json")).unwrap();
        catalog.create_table(schema("accounts")).unwrap();
        assert!(catalog.describe_table("accounts").is_some());
        assert!(catalog.describe_table("missing").is_none());
    }

    #[test]
    fn create_table_twice_is_resource_in_use() {
        let dir = tempdir().unwrap();
        let catalog = TableCatalog::open(dir.path().join("catalog.json")).unwrap();
        catalog.create_table(schema("accounts")).unwrap();
        let err = catalog.create_table(schema("accounts")).unwrap_err();
        assert!(matches!(err, StoreError::ResourceInUse(_)));
    }

    #[test]
    fn delete_missing_table_is_resource_not_found() {
        let dir = tempdir().unwrap();
        let catalog = TableCatalog::open(dir.path().join("catalog.json")).unwrap();
        assert!(matches!(catalog.delete_table("missing").unwrap_err(), StoreError::ResourceNotFound(_)));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        {
            let catalog = TableCatalog::open(&path).unwrap();
            catalog.create_table(schema("accounts")).unwrap();
        }
        let reopened = TableCatalog::open(&path).unwrap();
        assert_eq!(reopened.list_tables(), vec!["accounts".to_string()]);
    }
}
