//! Archive writer.

use crate::backend::StorageBackend;
use crate::error::ArchiveError;
use crate::format::{BlobEntry, Manifest, TableUnit, MANIFEST_NAME};
use crate::integrity::{chunked_sha256, sha256_hex};
use bytes::Bytes;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use portavault_core::Row;
use std::io::Write;
use std::sync::Arc;

struct OpenUnit {
    name: String,
    encoder: GzEncoder<Vec<u8>>,
    rows: u64,
}

/// Default chunk size for unit hashing and multipart upload (8 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Streams transformed rows and blobs into an archive prefix on a backend.
///
/// Table units are written one at a time: `begin_table`, `write_row` per
/// row, `finish_table`. The manifest is written last by `finalize`, so a
/// crashed export never leaves a readable but incomplete archive.
pub struct ArchiveWriter {
    backend: Arc<dyn StorageBackend>,
    prefix: String,
    manifest: Manifest,
    open: Option<OpenUnit>,
    next_blob: u64,
    chunk_size: usize,
}

impl ArchiveWriter {
    /// Create a writer for the given archive prefix.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        prefix: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            manifest: Manifest::new(tenant_id, DEFAULT_CHUNK_SIZE as u64),
            open: None,
            next_blob: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the chunk size used for unit hashing and multipart upload.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self.manifest.chunk_size = self.chunk_size as u64;
        self
    }

    fn full_path(&self, relative: &str) -> String {
        format!("{}/{}", self.prefix, relative)
    }

    /// Start a new table unit.
    pub fn begin_table(&mut self, name: impl Into<String>) -> Result<(), ArchiveError> {
        if let Some(open) = &self.open {
            return Err(ArchiveError::Misuse(format!(
                "table unit '{}' still open",
                open.name
            )));
        }
        self.open = Some(OpenUnit {
            name: name.into(),
            encoder: GzEncoder::new(Vec::new(), Compression::default()),
            rows: 0,
        });
        Ok(())
    }

    /// Append one row to the open table unit.
    pub fn write_row(&mut self, row: &Row) -> Result<(), ArchiveError> {
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| ArchiveError::Misuse("write_row without begin_table".into()))?;
        let line = serde_json::to_vec(row)?;
        open.encoder.write_all(&line)?;
        open.encoder.write_all(b"\n")?;
        open.rows += 1;
        Ok(())
    }

    /// Close the open table unit and upload it. Units larger than the
    /// chunk size go through the backend's multipart upload.
    pub async fn finish_table(&mut self) -> Result<(), ArchiveError> {
        let open = self
            .open
            .take()
            .ok_or_else(|| ArchiveError::Misuse("finish_table without begin_table".into()))?;
        let compressed = open.encoder.finish()?;
        let hash = chunked_sha256(&compressed, self.chunk_size);
        let path = format!("tables/{}.jsonl.gz", open.name);
        let full = self.full_path(&path);

        if compressed.len() > self.chunk_size {
            let data = Bytes::from(compressed);
            let upload = self.backend.initiate_upload(&full).await?;
            for (index, offset) in (0..data.len()).step_by(self.chunk_size).enumerate() {
                let end = (offset + self.chunk_size).min(data.len());
                self.backend
                    .upload_chunk(&upload, index as u32, data.slice(offset..end))
                    .await?;
            }
            self.backend.finalize_upload(&upload).await?;
        } else {
            self.backend.save(&full, Bytes::from(compressed)).await?;
        }

        tracing::debug!(table = %open.name, rows = open.rows, hash = %hash, "table unit written");
        self.manifest.tables.push(TableUnit {
            name: open.name,
            path,
            rows: open.rows,
            hash: hash.to_string(),
        });
        Ok(())
    }

    /// Store a blob payload and record it in the manifest.
    pub async fn add_blob(
        &mut self,
        original_path: impl Into<String>,
        data: Bytes,
    ) -> Result<(), ArchiveError> {
        let archive_path = format!("blobs/{}", self.next_blob);
        self.next_blob += 1;

        let entry = BlobEntry {
            original_path: original_path.into(),
            archive_path: archive_path.clone(),
            size: data.len() as u64,
            hash: sha256_hex(&data),
        };
        self.backend
            .save(&self.full_path(&archive_path), data)
            .await?;
        self.manifest.blobs.push(entry);
        Ok(())
    }

    /// Write the manifest and return it with the archive locator.
    pub async fn finalize(mut self) -> Result<(String, Manifest), ArchiveError> {
        if let Some(open) = &self.open {
            return Err(ArchiveError::Misuse(format!(
                "finalize with table unit '{}' still open",
                open.name
            )));
        }
        self.manifest.created_at = Utc::now();
        let encoded = serde_json::to_vec_pretty(&self.manifest)?;
        // The archive's locator is its prefix; the manifest locator is an
        // implementation detail of the backend.
        self.backend
            .save(&self.full_path(MANIFEST_NAME), Bytes::from(encoded))
            .await?;

        tracing::info!(
            prefix = %self.prefix,
            tables = self.manifest.tables.len(),
            rows = self.manifest.total_rows(),
            blobs = self.manifest.blobs.len(),
            "archive finalized"
        );
        Ok((self.prefix, self.manifest))
    }
}
