//! Bucketed blob path scheme.
//!
//! Source stores address file payloads as
//! `folder_<bucket>/file_<id>/v<version>/<name>`, where the bucket groups
//! file ids in blocks of one thousand. After a file id is remapped the path
//! must be rewritten with the bucket recomputed from the new id.

use crate::error::ArchiveError;
use std::fmt;

/// A parsed bucketed blob path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPath {
    /// Bucket component, always `bucket_for(file_id)`.
    pub bucket: i64,
    /// Owning file id.
    pub file_id: i64,
    /// File version.
    pub version: u32,
    /// File name.
    pub name: String,
}

/// Bucket a file id belongs to: ids 0..=999 map to 1000, 1000..=1999 to
/// 2000, and so on.
pub fn bucket_for(file_id: i64) -> i64 {
    (file_id / 1000 + 1) * 1000
}

impl BlobPath {
    /// Build a path for a file id, with the bucket derived from the id.
    pub fn new(file_id: i64, version: u32, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket_for(file_id),
            file_id,
            version,
            name: name.into(),
        }
    }

    /// Parse a store path of the form
    /// `folder_<bucket>/file_<id>/v<version>/<name>`.
    pub fn parse(path: &str) -> Result<Self, ArchiveError> {
        let invalid = || ArchiveError::InvalidBlobPath {
            path: path.to_string(),
        };

        let mut parts = path.splitn(4, '/');
        let folder = parts.next().ok_or_else(invalid)?;
        let file = parts.next().ok_or_else(invalid)?;
        let version = parts.next().ok_or_else(invalid)?;
        let name = parts.next().ok_or_else(invalid)?;

        let bucket = folder
            .strip_prefix("folder_")
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(invalid)?;
        let file_id = file
            .strip_prefix("file_")
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(invalid)?;
        let version = version
            .strip_prefix('v')
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            bucket,
            file_id,
            version,
            name: name.to_string(),
        })
    }

    /// Rewrite the path for a remapped file id, recomputing the bucket.
    pub fn remapped(&self, new_file_id: i64) -> Self {
        Self::new(new_file_id, self.version, self.name.clone())
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "folder_{}/file_{}/v{}/{}",
            self.bucket, self.file_id, self.version, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucketing() {
        assert_eq!(bucket_for(0), 1000);
        assert_eq!(bucket_for(42), 1000);
        assert_eq!(bucket_for(999), 1000);
        assert_eq!(bucket_for(1000), 2000);
        assert_eq!(bucket_for(2500), 3000);
    }

    #[test]
    fn test_parse_and_format() {
        let path = BlobPath::parse("folder_1000/file_42/v3/report with spaces.docx").unwrap();
        assert_eq!(path.bucket, 1000);
        assert_eq!(path.file_id, 42);
        assert_eq!(path.version, 3);
        assert_eq!(path.name, "report with spaces.docx");
        assert_eq!(
            path.to_string(),
            "folder_1000/file_42/v3/report with spaces.docx"
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "file_42/v3/name",
            "folder_x/file_42/v3/name",
            "folder_1000/file_42/v3/",
            "folder_1000/file_42/3/name",
            "folder_1000/42/v3/name",
        ] {
            assert!(
                matches!(BlobPath::parse(bad), Err(ArchiveError::InvalidBlobPath { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_remap_recomputes_bucket() {
        let path = BlobPath::parse("folder_1000/file_42/v1/a.txt").unwrap();
        let remapped = path.remapped(2500);
        assert_eq!(remapped.to_string(), "folder_3000/file_2500/v1/a.txt");
    }
}
