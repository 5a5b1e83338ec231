//! Archive logical layout.
//!
//! An archive is a directory-shaped namespace on a storage backend:
//!
//! ```text
//! <prefix>/manifest.json
//! <prefix>/tables/<table>.jsonl.gz     one gzip JSON-lines unit per table
//! <prefix>/blobs/<n>                   blob payloads, addressed by manifest
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current archive format version. Readers accept any version up to this.
pub const FORMAT_VERSION: u32 = 1;

/// Manifest file name within the archive prefix.
pub const MANIFEST_NAME: &str = "manifest.json";

/// One addressable unit of exported table rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableUnit {
    /// Table name.
    pub name: String,
    /// Archive-relative path of the gzip JSON-lines payload.
    pub path: String,
    /// Number of rows written.
    pub rows: u64,
    /// Chunked SHA-256 of the compressed payload, `<hex>-<chunks>`, using
    /// the manifest's chunk size.
    pub hash: String,
}

/// One blob carried alongside the table rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobEntry {
    /// Original path in the source store
    /// (`folder_<bucket>/file_<id>/v<version>/<name>`).
    pub original_path: String,
    /// Archive-relative path of the payload.
    pub archive_path: String,
    /// Payload size in bytes.
    pub size: u64,
    /// SHA-256 of the payload, hex encoded.
    pub hash: String,
}

/// The archive manifest, written last on export and read first on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Archive format version.
    pub format_version: u32,
    /// Source tenant id.
    pub tenant_id: String,
    /// Chunk size, in bytes, used for unit hashing and multipart upload.
    pub chunk_size: u64,
    /// When the export completed.
    pub created_at: DateTime<Utc>,
    /// Table units, in export order.
    pub tables: Vec<TableUnit>,
    /// Blob manifest.
    pub blobs: Vec<BlobEntry>,
}

impl Manifest {
    /// Create a manifest for the current format version.
    pub fn new(tenant_id: impl Into<String>, chunk_size: u64) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            tenant_id: tenant_id.into(),
            chunk_size,
            created_at: Utc::now(),
            tables: Vec::new(),
            blobs: Vec::new(),
        }
    }

    /// Look up a table unit by name.
    pub fn table(&self, name: &str) -> Option<&TableUnit> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Total rows across all units.
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_round_trip() {
        let mut manifest = Manifest::new("42", 1024);
        manifest.tables.push(TableUnit {
            name: "rooms".into(),
            path: "tables/rooms.jsonl.gz".into(),
            rows: 3,
            hash: format!("{}-1", "cd".repeat(32)),
        });
        manifest.blobs.push(BlobEntry {
            original_path: "folder_1000/file_42/v1/report.docx".into(),
            archive_path: "blobs/0".into(),
            size: 128,
            hash: "ab".repeat(32),
        });

        let json = serde_json::to_string(&manifest).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, back);
        assert_eq!(back.table("rooms").unwrap().rows, 3);
        assert_eq!(back.total_rows(), 3);
        assert!(back.table("missing").is_none());
    }
}
