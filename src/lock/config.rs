//! Configuration for distributed lock backends

use crate::config::{LockConfig, RedisConfig};
use crate::lock::file_lock::FileLock;
use crate::lock::redis_lock::RedisLock;
use crate::lock::DistributedLock;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Available lock backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    #[default]
    File,
    Redis,
}

impl std::str::FromStr for LockBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "filesystem" | "local" => Ok(LockBackend::File),
            "redis" => Ok(LockBackend::Redis),
            _ => Err(format!("Unknown lock backend: {}", s)),
        }
    }
}

/// Create a lock based on the configuration.
///
/// A Redis lock that cannot be constructed falls back to a file lock.
pub fn create_lock(config: &LockConfig, redis: &RedisConfig) -> std::io::Result<Arc<dyn DistributedLock>> {
    match config.backend {
        LockBackend::Redis => match RedisLock::new(&redis.url()) {
            Ok(lock) => {
                info!("Using Redis lock backend at {}:{}", redis.host, redis.port);
                return Ok(Arc::new(lock));
            }
            Err(e) => {
                warn!("Failed to configure Redis lock, falling back to file lock: {}", e);
            }
        },
        LockBackend::File => {}
    }
    info!("Using file lock backend in {}", config.lock_dir);
    Ok(Arc::new(FileLock::new(&config.lock_dir)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_backend_from_str() {
        assert_eq!("file".parse::<LockBackend>().unwrap(), LockBackend::File);
        assert_eq!("FILE".parse::<LockBackend>().unwrap(), LockBackend::File);
        assert_eq!("redis".parse::<LockBackend>().unwrap(), LockBackend::Redis);
        assert_eq!("Redis".parse::<LockBackend>().unwrap(), LockBackend::Redis);
        assert!("zookeeper".parse::<LockBackend>().is_err());
    }

    #[test]
    fn test_create_file_lock() {
        let dir = TempDir::new().unwrap();
        let config = LockConfig {
            backend: LockBackend::File,
            lock_dir: dir.path().to_string_lossy().into_owned(),
            timeout_secs: 900,
        };
        let lock = create_lock(&config, &RedisConfig::default()).unwrap();
        assert_eq!(lock.backend_name(), "file");
    }

    #[test]
    fn test_create_redis_lock_does_not_connect() {
        let dir = TempDir::new().unwrap();
        let config = LockConfig {
            backend: LockBackend::Redis,
            lock_dir: dir.path().to_string_lossy().into_owned(),
            timeout_secs: 900,
        };
        let redis = RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..RedisConfig::default()
        };
        let lock = create_lock(&config, &redis).unwrap();
        assert_eq!(lock.backend_name(), "redis");
    }
}
