//! Archive reader.

use crate::backend::StorageBackend;
use crate::error::ArchiveError;
use crate::format::{BlobEntry, Manifest, FORMAT_VERSION, MANIFEST_NAME};
use crate::integrity::chunked_sha256;
use bytes::Bytes;
use flate2::read::GzDecoder;
use portavault_core::Row;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

/// Reads an archive previously written by [`crate::ArchiveWriter`].
pub struct ArchiveReader {
    backend: Arc<dyn StorageBackend>,
    prefix: String,
    manifest: Manifest,
}

impl fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("prefix", &self.prefix)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl ArchiveReader {
    /// Open an archive by its prefix, reading and validating the manifest.
    pub async fn open(
        backend: Arc<dyn StorageBackend>,
        prefix: impl Into<String>,
    ) -> Result<Self, ArchiveError> {
        let prefix = prefix.into();
        let manifest_path = format!("{prefix}/{MANIFEST_NAME}");
        let raw = backend.read(&manifest_path).await?;
        let manifest: Manifest = serde_json::from_slice(&raw)?;

        if manifest.format_version > FORMAT_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                found: manifest.format_version,
                supported: FORMAT_VERSION,
            });
        }

        tracing::info!(
            prefix = %prefix,
            tenant = %manifest.tenant_id,
            tables = manifest.tables.len(),
            rows = manifest.total_rows(),
            "archive opened"
        );

        Ok(Self {
            backend,
            prefix,
            manifest,
        })
    }

    /// The archive manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Read and decode all rows of a table unit, verifying its chunked
    /// hash against the manifest.
    pub async fn read_table(&self, name: &str) -> Result<Vec<Row>, ArchiveError> {
        let unit = self
            .manifest
            .table(name)
            .ok_or_else(|| ArchiveError::MissingTable {
                table: name.to_string(),
            })?;

        let compressed = self
            .backend
            .read(&format!("{}/{}", self.prefix, unit.path))
            .await?;

        if self.manifest.chunk_size > 0 {
            let actual = chunked_sha256(&compressed, self.manifest.chunk_size as usize);
            if actual.to_string() != unit.hash {
                return Err(ArchiveError::Corrupt(format!(
                    "table unit '{}' hash mismatch: computed {}, manifest says {}",
                    name, actual, unit.hash
                )));
            }
        }

        let mut rows = Vec::with_capacity(unit.rows as usize);
        let decoder = BufReader::new(GzDecoder::new(&compressed[..]));
        for line in decoder.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            rows.push(serde_json::from_str(&line)?);
        }

        if rows.len() as u64 != unit.rows {
            return Err(ArchiveError::Corrupt(format!(
                "table unit '{}' has {} rows, manifest says {}",
                name,
                rows.len(),
                unit.rows
            )));
        }
        Ok(rows)
    }

    /// Read a blob payload by its manifest entry.
    pub async fn read_blob(&self, entry: &BlobEntry) -> Result<Bytes, ArchiveError> {
        self.backend
            .read(&format!("{}/{}", self.prefix, entry.archive_path))
            .await
    }
}
