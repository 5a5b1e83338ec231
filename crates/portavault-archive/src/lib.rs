//! Portavault Archive - portable archive format and transport.
//!
//! Serializes exported table rows and blob references into a
//! storage-backend-agnostic archive layout, and provides the integrity
//! hashing used to verify single-shot and multipart archive payloads.

pub mod backend;
pub mod blobs;
pub mod error;
pub mod format;
pub mod integrity;
pub mod reader;
pub mod writer;

pub use backend::{ObjectStoreBackend, StorageBackend, UploadId};
pub use blobs::BlobPath;
pub use error::ArchiveError;
pub use format::{BlobEntry, Manifest, TableUnit, FORMAT_VERSION};
pub use integrity::{chunked_sha256, sha256_hex, ChunkedHash, ChunkedHasher};
pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;
