//! S3 and S3-compatible (MinIO) blob storage implementation

use crate::storage::{BlobStore, StorageError, StorageResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use log::{debug, info};

/// Region used when none is configured, and always for S3-compatible services.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for an S3 bucket.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub prefix: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Address objects as `endpoint/bucket/key` instead of `bucket.endpoint/key`.
    pub force_path_style: bool,
}

/// Blob store backed by an S3 bucket.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    endpoint: Option<String>,
    region: String,
}

impl std::fmt::Debug for S3BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3BlobStore")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3BlobStore {
    /// Create a store for the configured bucket.
    ///
    /// Static credentials must be given as a pair. Without them the AWS
    /// default credential chain (environment, profile, instance role) is used.
    pub async fn new(settings: S3Settings) -> StorageResult<Self> {
        if settings.bucket.is_empty() {
            return Err(StorageError::Config("s3 bucket name is required".to_string()));
        }
        if settings.access_key.is_some() != settings.secret_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key and secret_key when either is set".to_string(),
            ));
        }

        let region = settings
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut builder = match (&settings.access_key, &settings.secret_key) {
            (Some(key_id), Some(secret)) => {
                let credentials = aws_sdk_s3::config::Credentials::new(
                    key_id.clone(),
                    secret.clone(),
                    None,
                    None,
                    "devbin-config",
                );
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(aws_config::Region::new(region.clone()))
                    .credentials_provider(credentials)
            }
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(aws_config::Region::new(region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        let client = Client::from_conf(builder.build());
        let prefix = settings
            .prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());

        info!(
            "Using S3 blob storage: bucket={}, region={}, endpoint={:?}",
            settings.bucket, region, settings.endpoint
        );

        Ok(Self {
            client,
            bucket: settings.bucket,
            prefix,
            endpoint: settings.endpoint,
            region,
        })
    }

    /// Create a store for an S3-compatible service such as MinIO.
    ///
    /// The scheme is chosen from `secure` unless `endpoint` already has one.
    /// Path-style addressing and the default region are always used.
    pub async fn s3_compatible(
        endpoint: &str,
        secure: bool,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
    ) -> StorageResult<Self> {
        Self::new(S3Settings {
            bucket: bucket.to_string(),
            region: Some(DEFAULT_REGION.to_string()),
            endpoint: Some(endpoint_url(endpoint, secure)),
            prefix: None,
            access_key: Some(access_key.to_string()),
            secret_key: Some(secret_key.to_string()),
            force_path_style: true,
        })
        .await
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn strip_prefix(&self, full_key: &str) -> String {
        match &self.prefix {
            Some(prefix) => {
                let prefix_with_slash = format!("{}/", prefix);
                full_key
                    .strip_prefix(&prefix_with_slash)
                    .unwrap_or(full_key)
                    .to_string()
            }
            None => full_key.to_string(),
        }
    }
}

/// Prepend `http://` or `https://` to a bare `host:port` endpoint.
pub fn endpoint_url(endpoint: &str, secure: bool) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{}", endpoint)
    } else {
        format!("http://{}", endpoint)
    }
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => service_err.raw().status().as_u16() == 404,
        _ => false,
    }
}

fn s3_error<E>(err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(s3_error)?;
        debug!("Stored {} bytes at s3://{}/{}", size, self.bucket, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(err) => return Err(s3_error(err)),
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?
            .into_bytes();
        Ok(Some(bytes))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(s3_error(err)),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(s3_error(err)),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let full_prefix = self.full_key(prefix);
        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(s3_error)?;

            for obj in output.contents() {
                if let Some(obj_key) = obj.key() {
                    results.push(self.strip_prefix(obj_key));
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        if self.endpoint.is_some() {
            "s3-compatible"
        } else {
            "s3"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_settings() -> S3Settings {
        S3Settings {
            bucket: "pastes".to_string(),
            region: Some("eu-west-1".to_string()),
            endpoint: Some("http://127.0.0.1:9000".to_string()),
            prefix: Some("devbin/".to_string()),
            access_key: Some("key".to_string()),
            secret_key: Some("secret".to_string()),
            force_path_style: true,
        }
    }

    #[test]
    fn test_endpoint_url_scheme_selection() {
        assert_eq!(endpoint_url("minio:9000", false), "http://minio:9000");
        assert_eq!(endpoint_url("minio:9000", true), "https://minio:9000");
        assert_eq!(endpoint_url("https://minio:9000", false), "https://minio:9000");
        assert_eq!(endpoint_url("HTTP://minio:9000", true), "HTTP://minio:9000");
    }

    #[tokio::test]
    async fn test_rejects_half_configured_credentials() {
        let mut settings = static_settings();
        settings.secret_key = None;
        let result = S3BlobStore::new(settings).await;
        assert!(matches!(result, Err(StorageError::Config(_))));
    }

    #[tokio::test]
    async fn test_rejects_empty_bucket() {
        let mut settings = static_settings();
        settings.bucket = String::new();
        assert!(matches!(
            S3BlobStore::new(settings).await,
            Err(StorageError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_prefix_is_normalized() {
        let store = S3BlobStore::new(static_settings()).await.unwrap();
        assert_eq!(store.full_key("pastes/a.txt"), "devbin/pastes/a.txt");
        assert_eq!(store.strip_prefix("devbin/pastes/a.txt"), "pastes/a.txt");
        assert_eq!(store.region, "eu-west-1");
    }

    #[tokio::test]
    async fn test_s3_compatible_uses_default_region() {
        let store = S3BlobStore::s3_compatible("minio:9000", false, "pastes", "k", "s")
            .await
            .unwrap();
        assert_eq!(store.region, DEFAULT_REGION);
        assert_eq!(store.endpoint(), Some("http://minio:9000"));
        assert_eq!(store.bucket(), "pastes");
        assert_eq!(store.backend_name(), "s3-compatible");
    }
}
