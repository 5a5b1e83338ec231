//! Storage backend contract.
//!
//! The engine treats archive contents as opaque byte streams addressed by
//! path; where the bytes physically live is the backend's business. The
//! provided [`ObjectStoreBackend`] adapts any [`object_store::ObjectStore`]
//! implementation, which covers local disk and in-memory stores as well as
//! the S3-compatible ones.

use crate::error::ArchiveError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle for an in-progress chunked upload.
pub type UploadId = String;

/// Physical transport for archive bytes.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist a payload, returning its locator.
    async fn save(&self, path: &str, data: Bytes) -> Result<String, ArchiveError>;

    /// Read a payload back.
    async fn read(&self, path: &str) -> Result<Bytes, ArchiveError>;

    /// Delete a payload. Deleting a missing path is not an error.
    async fn delete(&self, path: &str) -> Result<(), ArchiveError>;

    /// Whether a payload exists.
    async fn exists(&self, path: &str) -> Result<bool, ArchiveError>;

    /// Begin a chunked upload targeting `path`.
    async fn initiate_upload(&self, path: &str) -> Result<UploadId, ArchiveError>;

    /// Add one chunk to an upload. Chunks may arrive out of order.
    async fn upload_chunk(
        &self,
        id: &UploadId,
        index: u32,
        data: Bytes,
    ) -> Result<(), ArchiveError>;

    /// Complete an upload, assembling chunks in index order.
    async fn finalize_upload(&self, id: &UploadId) -> Result<String, ArchiveError>;
}

struct PendingUpload {
    path: String,
    parts: BTreeMap<u32, Bytes>,
}

/// [`StorageBackend`] over any [`object_store::ObjectStore`].
pub struct ObjectStoreBackend<S> {
    store: S,
    uploads: DashMap<String, PendingUpload>,
    next_upload: AtomicU64,
}

impl<S: ObjectStore> ObjectStoreBackend<S> {
    /// Wrap an object store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            uploads: DashMap::new(),
            next_upload: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl<S: ObjectStore> StorageBackend for ObjectStoreBackend<S> {
    async fn save(&self, path: &str, data: Bytes) -> Result<String, ArchiveError> {
        let location = Path::from(path);
        self.store.put(&location, PutPayload::from(data)).await?;
        Ok(path.to_string())
    }

    async fn read(&self, path: &str) -> Result<Bytes, ArchiveError> {
        let location = Path::from(path);
        Ok(self.store.get(&location).await?.bytes().await?)
    }

    async fn delete(&self, path: &str) -> Result<(), ArchiveError> {
        let location = Path::from(path);
        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, ArchiveError> {
        let location = Path::from(path);
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn initiate_upload(&self, path: &str) -> Result<UploadId, ArchiveError> {
        let id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::SeqCst));
        self.uploads.insert(
            id.clone(),
            PendingUpload {
                path: path.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn upload_chunk(
        &self,
        id: &UploadId,
        index: u32,
        data: Bytes,
    ) -> Result<(), ArchiveError> {
        let mut upload = self
            .uploads
            .get_mut(id)
            .ok_or_else(|| ArchiveError::UnknownUpload { id: id.clone() })?;
        upload.parts.insert(index, data);
        Ok(())
    }

    async fn finalize_upload(&self, id: &UploadId) -> Result<String, ArchiveError> {
        let (_, upload) = self
            .uploads
            .remove(id)
            .ok_or_else(|| ArchiveError::UnknownUpload { id: id.clone() })?;

        let total: usize = upload.parts.values().map(Bytes::len).sum();
        let mut assembled = BytesMut::with_capacity(total);
        for part in upload.parts.values() {
            assembled.extend_from_slice(part);
        }

        tracing::debug!(
            path = %upload.path,
            parts = upload.parts.len(),
            bytes = total,
            "chunked upload finalized"
        );
        self.save(&upload.path, assembled.freeze()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn backend() -> ObjectStoreBackend<InMemory> {
        ObjectStoreBackend::new(InMemory::new())
    }

    #[tokio::test]
    async fn test_save_read_delete() {
        let backend = backend();
        let locator = backend
            .save("t/archive.bin", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert_eq!(locator, "t/archive.bin");

        assert!(backend.exists("t/archive.bin").await.unwrap());
        let data = backend.read("t/archive.bin").await.unwrap();
        assert_eq!(&data[..], b"payload");

        backend.delete("t/archive.bin").await.unwrap();
        assert!(!backend.exists("t/archive.bin").await.unwrap());
        // Deleting again is a no-op.
        backend.delete("t/archive.bin").await.unwrap();
    }

    #[tokio::test]
    async fn test_chunked_upload_out_of_order() {
        let backend = backend();
        let id = backend.initiate_upload("t/big.bin").await.unwrap();

        backend
            .upload_chunk(&id, 1, Bytes::from_static(b"world"))
            .await
            .unwrap();
        backend
            .upload_chunk(&id, 0, Bytes::from_static(b"hello "))
            .await
            .unwrap();

        let locator = backend.finalize_upload(&id).await.unwrap();
        let data = backend.read(&locator).await.unwrap();
        assert_eq!(&data[..], b"hello world");

        // The upload handle is consumed.
        let err = backend.finalize_upload(&id).await.unwrap_err();
        assert!(matches!(err, ArchiveError::UnknownUpload { .. }));
    }

    #[tokio::test]
    async fn test_unknown_upload_rejected() {
        let backend = backend();
        let err = backend
            .upload_chunk(&"nope".to_string(), 0, Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnknownUpload { .. }));
    }
}
