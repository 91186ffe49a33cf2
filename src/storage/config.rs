//! Configuration for blob storage backends

use crate::config::StorageConfig;
use crate::storage::local_store::LocalBlobStore;
use crate::storage::s3_store::{S3BlobStore, S3Settings};
use crate::storage::{BlobStore, StorageResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Available blob storage backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
    Minio,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "filesystem" | "fs" => Ok(StorageBackend::Local),
            "s3" | "aws" => Ok(StorageBackend::S3),
            "minio" | "s3-compatible" | "s3_compatible" => Ok(StorageBackend::Minio),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// Create a blob store based on the configuration
pub async fn create_store(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    match config.backend {
        StorageBackend::Local => {
            info!("Using local blob storage backend with base_path: {}", config.base_path);
            Ok(Arc::new(LocalBlobStore::new(&config.base_path)?))
        }
        StorageBackend::S3 => {
            info!("Using S3 blob storage backend with bucket: {}", config.s3.bucket);
            let store = S3BlobStore::new(S3Settings {
                bucket: config.s3.bucket.clone(),
                region: config.s3.region.clone(),
                endpoint: config.s3.endpoint_url.clone(),
                prefix: config.s3.prefix.clone(),
                access_key: config.s3.access_key.clone(),
                secret_key: config.s3.secret_key.clone(),
                force_path_style: config.s3.endpoint_url.is_some(),
            })
            .await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Minio => {
            info!(
                "Using MinIO blob storage backend at {} with bucket: {}",
                config.minio.endpoint, config.minio.bucket
            );
            let store = S3BlobStore::s3_compatible(
                &config.minio.endpoint,
                config.minio.secure,
                &config.minio.bucket,
                &config.minio.access_key,
                &config.minio.secret_key,
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}
