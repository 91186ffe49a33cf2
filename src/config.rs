//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults and
//! `DEVBIN_*` environment variable overrides for backends and secrets.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use log::{info, warn};
use thiserror::Error;

pub use crate::cache::config::CacheBackend;
pub use crate::lock::config::LockBackend;
pub use crate::storage::config::StorageBackend;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "DEVBIN_CONFIG";

/// Retention sentinel meaning soft-deleted pastes are never purged
pub const KEEP_DELETED_FOREVER: i64 = -1;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Blob storage configuration
    pub storage: StorageConfig,
    /// Distributed lock configuration
    pub lock: LockConfig,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Redis connection shared by the lock and cache backends
    pub redis: RedisConfig,
    /// Relational store configuration
    pub metadata: MetadataConfig,
    /// Paste lifecycle configuration
    pub paste: PasteConfig,
    /// Cleanup worker configuration
    pub cleanup: CleanupConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
    /// Maximum JSON body size in bytes
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            workers: 4,
            max_payload_size: 1024 * 1024,
        }
    }
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Base directory for the local backend
    pub base_path: String,
    pub s3: S3Config,
    pub minio: MinioConfig,
    /// Free space floor in megabytes below which creates are refused; 0 disables the check
    pub min_free_mb: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            base_path: "./files".to_string(),
            s3: S3Config::default(),
            minio: MinioConfig::default(),
            min_free_mb: 1024,
        }
    }
}

impl StorageConfig {
    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_mb.saturating_mul(1024 * 1024)
    }
}

/// AWS S3 settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub prefix: Option<String>,
}

/// MinIO / S3-compatible settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinioConfig {
    /// `host:port`, with or without a scheme
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub secure: bool,
    pub bucket: String,
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:9000".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            secure: false,
            bucket: "devbin".to_string(),
        }
    }
}

/// Distributed lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub backend: LockBackend,
    /// Directory holding sentinel files for the file backend
    pub lock_dir: String,
    /// Seconds after which an untouched lock is stale
    pub timeout_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::File,
            lock_dir: "./files".to_string(),
            timeout_secs: 900,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Maximum entries for the in-memory backend
    pub capacity: usize,
    /// Default entry time to live in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            capacity: 500,
            ttl_secs: 300,
        }
    }
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl RedisConfig {
    /// Connection URL in the form understood by `redis::Client::open`
    pub fn url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Relational store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// SQLite database file path
    pub db_path: String,
    /// Enable WAL journal mode
    pub wal_mode: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/devbin.db".to_string(),
            wal_mode: true,
        }
    }
}

/// Paste lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasteConfig {
    /// Maximum content length in bytes
    pub max_content_length: usize,
    /// Hours soft-deleted pastes are kept before purging; -1 keeps them forever
    pub keep_deleted_hours: i64,
    pub compression_enabled: bool,
    /// Content of at least this many bytes is compressed
    pub compression_threshold: usize,
    /// gzip level, 0-9
    pub compression_level: u32,
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            max_content_length: 10_000,
            keep_deleted_hours: KEEP_DELETED_FOREVER,
            compression_enabled: true,
            compression_threshold: 512,
            compression_level: 6,
        }
    }
}

/// Cleanup worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    /// Seconds between cleanup cycles once the lock is held
    pub interval_secs: u64,
    /// Seconds between lock acquisition attempts
    pub acquire_retry_secs: u64,
    /// Seconds to wait after a failed cycle
    pub error_backoff_secs: u64,
    /// Pastes removed per batch
    pub batch_size: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 600,
            acquire_retry_secs: 300,
            error_backoff_secs: 60,
            batch_size: 100,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `DEVBIN_CONFIG` or `config.yaml`, apply
    /// environment overrides and validate. Defaults are used when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, use defaults if not found
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Override backend selection and secrets from `DEVBIN_*` variables
    pub fn apply_env_overrides(&mut self) {
        if let Some(backend) = parse_env::<StorageBackend>("DEVBIN_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }
        if let Some(backend) = parse_env::<LockBackend>("DEVBIN_LOCK_BACKEND") {
            self.lock.backend = backend;
        }
        if let Some(backend) = parse_env::<CacheBackend>("DEVBIN_CACHE_BACKEND") {
            self.cache.backend = backend;
        }
        if let Ok(path) = env::var("DEVBIN_BASE_FOLDER_PATH") {
            self.storage.base_path = path;
        }
        if let Ok(path) = env::var("DEVBIN_DB_PATH") {
            self.metadata.db_path = path;
        }
        if let Ok(bucket) = env::var("DEVBIN_S3_BUCKET") {
            self.storage.s3.bucket = bucket.clone();
            self.storage.minio.bucket = bucket;
        }
        if let Ok(key) = env::var("DEVBIN_S3_ACCESS_KEY") {
            self.storage.s3.access_key = Some(key.clone());
            self.storage.minio.access_key = key;
        }
        if let Ok(secret) = env::var("DEVBIN_S3_SECRET_KEY") {
            self.storage.s3.secret_key = Some(secret.clone());
            self.storage.minio.secret_key = secret;
        }
        if let Ok(host) = env::var("DEVBIN_REDIS_HOST") {
            self.redis.host = host;
        }
        if let Some(port) = parse_env::<u16>("DEVBIN_REDIS_PORT") {
            self.redis.port = port;
        }
        if let Ok(password) = env::var("DEVBIN_REDIS_PASSWORD") {
            self.redis.password = Some(password);
        }
        if let Some(hours) = parse_env::<i64>("DEVBIN_KEEP_DELETED_PASTES_TIME_HOURS") {
            self.paste.keep_deleted_hours = hours;
        }
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be at least 1".to_string()));
        }
        if self.cleanup.batch_size == 0 {
            return Err(ConfigError::Invalid("cleanup.batch_size must be at least 1".to_string()));
        }
        if self.paste.compression_level > 9 {
            return Err(ConfigError::Invalid(format!(
                "paste.compression_level must be between 0 and 9, got {}",
                self.paste.compression_level
            )));
        }
        if self.paste.keep_deleted_hours < KEEP_DELETED_FOREVER {
            return Err(ConfigError::Invalid(format!(
                "paste.keep_deleted_hours must be -1 or a non-negative number of hours, got {}",
                self.paste.keep_deleted_hours
            )));
        }
        if self.paste.max_content_length == 0 {
            return Err(ConfigError::Invalid("paste.max_content_length must be at least 1".to_string()));
        }
        if self.lock.timeout_secs == 0 {
            return Err(ConfigError::Invalid("lock.timeout_secs must be at least 1".to_string()));
        }
        if self.storage.backend == StorageBackend::S3 && self.storage.s3.bucket.is_empty() {
            return Err(ConfigError::Invalid("storage.s3.bucket is required for the s3 backend".to_string()));
        }
        if self.storage.backend == StorageBackend::Minio && self.storage.minio.bucket.is_empty() {
            return Err(ConfigError::Invalid("storage.minio.bucket is required for the minio backend".to_string()));
        }
        Ok(())
    }
}

/// Parse an environment variable, warning and ignoring it when invalid
fn parse_env<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(value) => {
            info!("Using {} from environment", name);
            Some(value)
        }
        Err(e) => {
            warn!("Invalid value for {}: {}. Keeping configured value.", name, e);
            None
        }
    }
}
