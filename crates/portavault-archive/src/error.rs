//! Archive error types.

use thiserror::Error;

/// Errors produced by archive serialization and transport.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Storage backend failure.
    #[error("storage backend error: {0}")]
    Backend(#[from] object_store::Error),

    /// Compression or decompression I/O failure.
    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),

    /// Row or manifest encoding failure.
    #[error("archive codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The archive was written by a newer, incompatible format.
    #[error("unsupported archive format version {found} (supported up to {supported})")]
    UnsupportedVersion {
        /// Version recorded in the manifest.
        found: u32,
        /// Highest version this reader understands.
        supported: u32,
    },

    /// Structural damage: missing or malformed archive content.
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    /// Writer API used out of order.
    #[error("archive writer misuse: {0}")]
    Misuse(String),

    /// A table unit named by the caller is not in the manifest.
    #[error("archive has no table unit '{table}'")]
    MissingTable {
        /// The requested table.
        table: String,
    },

    /// A blob path does not follow the bucketed store layout.
    #[error("invalid blob path '{path}'")]
    InvalidBlobPath {
        /// The offending path.
        path: String,
    },

    /// A chunked upload id is unknown to the backend.
    #[error("unknown upload '{id}'")]
    UnknownUpload {
        /// The upload id.
        id: String,
    },
}
