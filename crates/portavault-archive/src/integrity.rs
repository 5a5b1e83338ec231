//! Integrity hashing for archive payloads.
//!
//! Two modes: a whole-payload SHA-256 for single-shot checks, and a chunked
//! hash for multipart/resumable transfers. The chunked mode hashes each
//! fixed-size chunk independently, concatenates the chunk digests, hashes
//! the concatenation, and reports the result together with the chunk count
//! as `<hex>-<count>`. A multipart upload can thus be verified without
//! re-reading the whole object, and a resumed transfer re-hashes only the
//! remaining chunks.

use sha2::{Digest, Sha256};
use std::fmt;

/// Whole-payload SHA-256, hex encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Result of a chunked hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedHash {
    /// SHA-256 over the concatenated chunk digests, hex encoded.
    pub hex: String,
    /// Number of chunks hashed.
    pub chunks: u32,
}

impl fmt::Display for ChunkedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hex, self.chunks)
    }
}

/// Incremental chunked hasher.
///
/// Data may be fed in arbitrarily sized pieces; chunk boundaries are
/// tracked internally, so the result is independent of how the payload is
/// physically delivered.
pub struct ChunkedHasher {
    chunk_size: usize,
    current: Sha256,
    current_len: usize,
    digests: Sha256,
    chunks: u32,
}

impl ChunkedHasher {
    /// Create a hasher with the given chunk size.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            chunk_size,
            current: Sha256::new(),
            current_len: 0,
            digests: Sha256::new(),
            chunks: 0,
        }
    }

    /// Feed payload bytes.
    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = self.chunk_size - self.current_len;
            let take = room.min(data.len());
            self.current.update(&data[..take]);
            self.current_len += take;
            data = &data[take..];

            if self.current_len == self.chunk_size {
                self.finish_chunk();
            }
        }
    }

    fn finish_chunk(&mut self) {
        let digest = std::mem::take(&mut self.current).finalize();
        self.digests.update(digest);
        self.current_len = 0;
        self.chunks += 1;
    }

    /// Finish the final (possibly short) chunk and produce the result.
    pub fn finalize(mut self) -> ChunkedHash {
        if self.current_len > 0 {
            self.finish_chunk();
        }
        ChunkedHash {
            hex: hex::encode(self.digests.finalize()),
            chunks: self.chunks,
        }
    }
}

/// One-shot chunked hash of an in-memory payload.
pub fn chunked_sha256(data: &[u8], chunk_size: usize) -> ChunkedHash {
    let mut hasher = ChunkedHasher::new(chunk_size);
    hasher.update(data);
    hasher.finalize()
}
