//! Blob Storage Layer Abstraction
//!
//! This module provides an abstraction over key/bytes storage backends,
//! allowing paste content to live on a local disk, in AWS S3 or in an
//! S3-compatible service (MinIO) without affecting the lifecycle services.

pub mod config;
pub mod local_store;
pub mod mock_store;
pub mod s3_store;


use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Blob storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for blob storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Trait defining the blob storage interface.
///
/// Keys are relative, slash separated paths such as `pastes/<id>.txt`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `key`, replacing any previous value.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Read the value stored under `key`. A missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check whether `key` is present.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// List all keys starting with `prefix`, relative to the store root.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Bytes available for new writes, or `None` when the backend has no
    /// meaningful notion of free space.
    async fn free_space(&self) -> StorageResult<Option<u64>> {
        Ok(None)
    }

    /// Short backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Blob key for the content of a paste.
pub fn paste_content_key(paste_id: &uuid::Uuid) -> String {
    format!("pastes/{}.txt", paste_id)
}

/// Blob key for a legacy hastebin document, addressed by the md5 of its name.
pub fn legacy_content_key(name: &str) -> String {
    format!("hastebin/{}", hex::encode(md5::compute(name.as_bytes()).0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_paste_content_key() {
        let id = Uuid::parse_str("6f1c1d3e-7a9b-4c2d-8e0f-1a2b3c4d5e6f").unwrap();
        assert_eq!(
            paste_content_key(&id),
            "pastes/6f1c1d3e-7a9b-4c2d-8e0f-1a2b3c4d5e6f.txt"
        );
    }

    #[test]
    fn test_legacy_content_key_uses_md5_hex() {
        // md5("abc") is a well known digest
        assert_eq!(
            legacy_content_key("abc"),
            "hastebin/900150983cd24fb0d6963f7d28e17f72"
        );
    }
}
