//! Backup schedules and the durable record of produced archives.

use crate::config::EngineConfig;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declarative, recurring backup configuration for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSchedule {
    /// Target storage kind, e.g. `local` or `s3`.
    pub storage_kind: String,
    /// Storage-kind-specific parameters.
    pub storage_params: BTreeMap<String, String>,
    /// Number of archives kept before the oldest are pruned.
    pub retention: u32,
    /// Cron expression (5 or 6 whitespace-separated fields).
    pub cron: String,
    /// Whether the schedule produces a full-instance dump rather than a
    /// single tenant's archive.
    pub full_dump: bool,
}

impl BackupSchedule {
    /// Create a schedule with the given storage kind and cron expression.
    pub fn new(storage_kind: impl Into<String>, cron: impl Into<String>) -> Self {
        Self {
            storage_kind: storage_kind.into(),
            storage_params: BTreeMap::new(),
            retention: 1,
            cron: cron.into(),
            full_dump: false,
        }
    }

    /// Set a storage parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_params.insert(key.into(), value.into());
        self
    }

    /// Set the retention count.
    pub fn with_retention(mut self, retention: u32) -> Self {
        self.retention = retention;
        self
    }

    /// Mark the schedule as a full-instance dump.
    pub fn full_dump(mut self) -> Self {
        self.full_dump = true;
        self
    }

    /// Validate the schedule against the deployment configuration.
    pub fn validate(&self, config: &EngineConfig) -> Result<(), EngineError> {
        let fields = self.cron.split_whitespace().count();
        if !(5..=6).contains(&fields) {
            return Err(EngineError::Configuration(format!(
                "cron expression '{}' has {} fields, expected 5 or 6",
                self.cron, fields
            )));
        }
        if self.retention == 0 {
            return Err(EngineError::Configuration(
                "retention must be at least 1".to_string(),
            ));
        }

        let required = match self.storage_kind.as_str() {
            "local" => Some("path"),
            "s3" => Some("bucket"),
            "memory" => None,
            other => {
                return Err(EngineError::Configuration(format!(
                    "unknown storage kind '{other}'"
                )));
            }
        };
        if let Some(key) = required {
            if !self.storage_params.contains_key(key) {
                return Err(EngineError::Configuration(format!(
                    "storage kind '{}' requires parameter '{key}'",
                    self.storage_kind
                )));
            }
        }

        if self.full_dump && !config.allow_instance_dump {
            return Err(EngineError::InstanceDumpNotAllowed);
        }
        Ok(())
    }
}

/// Durable record of one produced archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupRecord {
    /// Record id (also the sled key suffix).
    pub id: String,
    /// Tenant the archive belongs to.
    pub tenant: String,
    /// Storage kind the archive was written to.
    pub storage_kind: String,
    /// Locator of the archive in that storage.
    pub storage_path: String,
    /// Chunked content hash of the archive, `<hex>-<chunks>`.
    pub hash: String,
    /// When the archive was produced.
    pub created_at: DateTime<Utc>,
}

const TREE_NAME: &str = "portavault_backups";
const KEY_SEP: char = '\u{1f}';

/// Sled-backed persistence for backup records, keyed so a tenant prefix
/// scan yields records in chronological order.
#[derive(Clone)]
pub struct RecordStore {
    tree: sled::Tree,
}

impl RecordStore {
    /// Open the record tree within a sled database.
    pub fn open(db: &sled::Db) -> Result<Self, EngineError> {
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { tree })
    }

    fn key(record: &BackupRecord) -> String {
        format!(
            "{}{KEY_SEP}{:020}{KEY_SEP}{}",
            record.tenant,
            record.created_at.timestamp_micros(),
            record.id
        )
    }

    /// Save a record.
    pub fn save(&self, record: &BackupRecord) -> Result<(), EngineError> {
        let value = serde_json::to_vec(record)?;
        self.tree.insert(Self::key(record).as_bytes(), value)?;
        Ok(())
    }

    /// All records for a tenant, oldest first.
    pub fn list(&self, tenant: &str) -> Result<Vec<BackupRecord>, EngineError> {
        let prefix = format!("{tenant}{KEY_SEP}");
        let mut records = Vec::new();
        for item in self.tree.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Prune the oldest records beyond `retention`, returning the pruned
    /// records so the caller can delete the underlying archives.
    pub fn apply_retention(
        &self,
        tenant: &str,
        retention: u32,
    ) -> Result<Vec<BackupRecord>, EngineError> {
        let records = self.list(tenant)?;
        let keep_from = records.len().saturating_sub(retention as usize);
        let pruned: Vec<BackupRecord> = records.into_iter().take(keep_from).collect();
        for record in &pruned {
            self.tree.remove(Self::key(record).as_bytes())?;
        }
        if !pruned.is_empty() {
            tracing::info!(tenant, pruned = pruned.len(), retention, "retention applied");
        }
        Ok(pruned)
    }
}
