//! Table descriptors.

use serde::{Deserialize, Serialize};

/// Shape of a table's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdKind {
    /// Auto-incremented integer key.
    Integer,
    /// GUID-style string key.
    Guid,
    /// Composite or otherwise encoded string key.
    Composite,
}

/// What to do when an inserted row collides with an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Plain insert; a collision is an error surfaced by the destination.
    Insert,
    /// Keep the existing row, discard the incoming one.
    Ignore,
    /// Overwrite the existing row.
    Replace,
}

/// A table owned by one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name (globally unique across all modules).
    pub name: String,
    /// Column holding the owning tenant id; `None` for tenant-independent
    /// tables.
    pub tenant_column: Option<String>,
    /// Primary-key column name.
    pub id_column: String,
    /// Shape of the primary key.
    pub id_kind: IdKind,
    /// Columns holding user-identity references.
    pub user_columns: Vec<String>,
    /// Datetime columns that need timezone normalization on restore.
    pub datetime_columns: Vec<String>,
    /// Insert-conflict policy for restore.
    pub conflict: ConflictPolicy,
}

impl TableDescriptor {
    /// Create a new table descriptor.
    pub fn new(name: impl Into<String>, id_column: impl Into<String>, id_kind: IdKind) -> Self {
        Self {
            name: name.into(),
            tenant_column: None,
            id_column: id_column.into(),
            id_kind,
            user_columns: Vec::new(),
            datetime_columns: Vec::new(),
            conflict: ConflictPolicy::Insert,
        }
    }

    /// Set the tenant-scope column.
    pub fn with_tenant_column(mut self, column: impl Into<String>) -> Self {
        self.tenant_column = Some(column.into());
        self
    }

    /// Add a user-identity column.
    pub fn with_user_column(mut self, column: impl Into<String>) -> Self {
        self.user_columns.push(column.into());
        self
    }

    /// Add a datetime column requiring timezone normalization.
    pub fn with_datetime_column(mut self, column: impl Into<String>) -> Self {
        self.datetime_columns.push(column.into());
        self
    }

    /// Set the insert-conflict policy.
    pub fn with_conflict(mut self, conflict: ConflictPolicy) -> Self {
        self.conflict = conflict;
        self
    }

    /// Whether this table is scoped to a tenant.
    pub fn is_tenant_scoped(&self) -> bool {
        self.tenant_column.is_some()
    }
}
