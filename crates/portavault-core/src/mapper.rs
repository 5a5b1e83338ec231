//! Per-operation identifier mapper.
//!
//! Maps `(table, column, old value)` to the destination-side value recorded
//! when the parent row was inserted. One mapper instance is exclusively
//! owned by a single running operation and never shared across operations
//! or tenants. Mappings are write-once: a conflicting re-set is rejected to
//! prevent silent identifier drift.

use crate::error::Error;
use crate::value::Value;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Separator between key components; never appears in table/column names.
const KEY_SEP: u8 = 0x1f;

/// Reserved key for the distinguished tenant mapping.
const TENANT_KEY: &str = "\u{1f}tenant";

/// Sentinel identifier values ("no user", "everyone" group, ...) that are
/// passed through unresolved rather than treated as remap failures.
#[derive(Debug, Clone, Default)]
pub struct Sentinels {
    values: HashSet<String>,
}

impl Sentinels {
    /// Create an empty sentinel set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sentinel value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.values.insert(value.into());
        self
    }

    /// Check a raw string against the set.
    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(value)
    }

    /// Check a column value against the set.
    pub fn matches(&self, value: &Value) -> bool {
        match value.as_key_string() {
            Some(key) => self.contains(&key),
            None => false,
        }
    }

    /// Build a set from any collection of values.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// In-memory (optionally sled-persisted) identifier mapping table.
pub struct IdentifierMapper {
    entries: DashMap<String, String>,
    sentinels: Sentinels,
    tenant: RwLock<Option<String>>,
    tree: Option<sled::Tree>,
}

impl IdentifierMapper {
    /// Create an in-memory mapper.
    pub fn new(sentinels: Sentinels) -> Self {
        Self {
            entries: DashMap::new(),
            sentinels,
            tenant: RwLock::new(None),
            tree: None,
        }
    }

    /// Create a mapper backed by a sled tree, reloading any entries a
    /// previous run of the same operation persisted.
    pub fn persistent(tree: sled::Tree, sentinels: Sentinels) -> Result<Self, Error> {
        let entries = DashMap::new();
        let mut tenant = None;

        for item in tree.iter() {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| Error::CorruptEntry(e.to_string()))?;
            let value = String::from_utf8(value.to_vec())
                .map_err(|e| Error::CorruptEntry(e.to_string()))?;
            if key == TENANT_KEY {
                tenant = Some(value);
            } else {
                entries.insert(key, value);
            }
        }

        Ok(Self {
            entries,
            sentinels,
            tenant: RwLock::new(tenant),
            tree: Some(tree),
        })
    }

    fn encode_key(table: &str, column: &str, old: &str) -> String {
        let mut key = String::with_capacity(table.len() + column.len() + old.len() + 2);
        key.push_str(table);
        key.push(KEY_SEP as char);
        key.push_str(column);
        key.push(KEY_SEP as char);
        key.push_str(old);
        key
    }

    fn persist(&self, key: &str, value: &str) -> Result<(), Error> {
        if let Some(tree) = &self.tree {
            tree.insert(key.as_bytes(), value.as_bytes())?;
        }
        Ok(())
    }

    /// Pure lookup, no side effects.
    pub fn get(&self, table: &str, column: &str, old: &str) -> Option<String> {
        self.entries
            .get(&Self::encode_key(table, column, old))
            .map(|v| v.clone())
    }

    /// Record a mapping. A repeat set with the same value succeeds
    /// silently; a conflicting value is rejected.
    pub fn set(
        &self,
        table: &str,
        column: &str,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Result<(), Error> {
        let old = old.into();
        let new = new.into();
        let key = Self::encode_key(table, column, &old);

        match self.entries.entry(key.clone()) {
            Entry::Occupied(existing) => {
                if *existing.get() == new {
                    Ok(())
                } else {
                    Err(Error::MappingConflict {
                        table: table.to_string(),
                        column: column.to_string(),
                        old,
                        existing: existing.get().clone(),
                        rejected: new,
                    })
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(new.clone());
                self.persist(&key, &new)
            }
        }
    }

    /// Record the distinguished tenant mapping, set once the destination
    /// tenant row has been created.
    pub fn set_tenant_mapping(&self, new_tenant: impl Into<String>) -> Result<(), Error> {
        let new_tenant = new_tenant.into();
        *self.tenant.write() = Some(new_tenant.clone());
        self.persist(TENANT_KEY, &new_tenant)
    }

    /// The destination tenant id, used to stamp every tenant-scoped row.
    pub fn tenant_mapping(&self) -> Result<String, Error> {
        self.tenant.read().clone().ok_or(Error::TenantMappingMissing)
    }

    /// Whether a value is a configured sentinel and must never be looked up.
    pub fn is_sentinel(&self, value: &Value) -> bool {
        self.sentinels.matches(value)
    }

    /// Number of recorded mappings (tenant mapping excluded).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no mappings have been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
