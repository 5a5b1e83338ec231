//! Tenant source/destination contracts.
//!
//! The physical database driver lives outside the engine; operations reach
//! rows through these two traits. [`MemoryStore`] implements both for tests
//! and embedded use.

use crate::error::EngineError;
use async_trait::async_trait;
use parking_lot::Mutex;
use portavault_core::{ConflictPolicy, Row, TableDescriptor, Value};
use std::collections::HashMap;

/// Read side: the shared store an export scans.
#[async_trait]
pub trait TenantSource: Send + Sync {
    /// All rows of a table belonging to the tenant. Tenant-independent
    /// tables ignore the tenant argument.
    async fn scan(&self, table: &TableDescriptor, tenant: &str) -> Result<Vec<Row>, EngineError>;
}

/// Write side: the store a restore inserts into.
#[async_trait]
pub trait TenantDestination: Send + Sync {
    /// Insert a transformed row, honoring the table's conflict policy.
    ///
    /// When `preserve_id` is set the row keeps its archived primary key;
    /// otherwise the destination assigns a fresh one. Returns the primary
    /// key of the stored row.
    async fn insert(
        &self,
        table: &TableDescriptor,
        row: Row,
        preserve_id: bool,
    ) -> Result<Value, EngineError>;

    /// Patch a single column of an existing row, used by the deferred
    /// low-importance pass to fix up parent pointers.
    async fn patch(
        &self,
        table: &TableDescriptor,
        id: &Value,
        column: &str,
        value: Value,
    ) -> Result<(), EngineError>;
}

/// In-memory relational store implementing both contracts.
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    next_id: Mutex<i64>,
}

impl MemoryStore {
    /// Create an empty store whose assigned integer ids start at
    /// `first_id`.
    pub fn new(first_id: i64) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            next_id: Mutex::new(first_id),
        }
    }

    /// Seed a row directly, bypassing transforms.
    pub fn put(&self, table: &str, row: Row) {
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    fn allocate_id(&self) -> i64 {
        let mut next = self.next_id.lock();
        let id = *next;
        *next += 1;
        id
    }
}

#[async_trait]
impl TenantSource for MemoryStore {
    async fn scan(&self, table: &TableDescriptor, tenant: &str) -> Result<Vec<Row>, EngineError> {
        let tables = self.tables.lock();
        let rows = tables.get(&table.name).cloned().unwrap_or_default();
        match &table.tenant_column {
            Some(column) => Ok(rows
                .into_iter()
                .filter(|row| {
                    row.get(column)
                        .and_then(|v| v.as_key_string())
                        .is_some_and(|t| t == tenant)
                })
                .collect()),
            None => Ok(rows),
        }
    }
}

#[async_trait]
impl TenantDestination for MemoryStore {
    async fn insert(
        &self,
        table: &TableDescriptor,
        mut row: Row,
        preserve_id: bool,
    ) -> Result<Value, EngineError> {
        let id = if preserve_id {
            row.get(&table.id_column).cloned().ok_or_else(|| {
                EngineError::Destination(format!(
                    "row for '{}' lacks its id column '{}'",
                    table.name, table.id_column
                ))
            })?
        } else {
            let id = Value::Int(self.allocate_id());
            row.set(table.id_column.clone(), id.clone());
            id
        };

        let mut tables = self.tables.lock();
        let rows = tables.entry(table.name.clone()).or_default();
        let existing = rows
            .iter()
            .position(|r| r.get(&table.id_column) == Some(&id));

        match (existing, table.conflict) {
            (Some(_), ConflictPolicy::Ignore) => {}
            (Some(idx), ConflictPolicy::Replace) => rows[idx] = row,
            (Some(_), ConflictPolicy::Insert) => {
                return Err(EngineError::Destination(format!(
                    "duplicate key in '{}'",
                    table.name
                )));
            }
            (None, _) => rows.push(row),
        }
        Ok(id)
    }

    async fn patch(
        &self,
        table: &TableDescriptor,
        id: &Value,
        column: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        let mut tables = self.tables.lock();
        let rows = tables.entry(table.name.clone()).or_default();
        let row = rows
            .iter_mut()
            .find(|r| r.get(&table.id_column) == Some(id))
            .ok_or_else(|| {
                EngineError::Destination(format!(
                    "no row in '{}' with id {:?} to patch",
                    table.name, id
                ))
            })?;
        row.set(column.to_string(), value);
        Ok(())
    }
}
