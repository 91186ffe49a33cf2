//! Configuration for cache backends

use crate::cache::memory_cache::MemoryCache;
use crate::cache::redis_cache::RedisCache;
use crate::cache::Cache;
use crate::config::{CacheConfig, RedisConfig};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Available cache backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

impl std::str::FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "lru" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            _ => Err(format!("Unknown cache backend: {}", s)),
        }
    }
}

/// Create a cache based on the configuration.
///
/// A Redis cache that cannot be constructed falls back to memory.
pub fn create_cache(config: &CacheConfig, redis: &RedisConfig) -> Arc<dyn Cache> {
    let ttl = Some(Duration::from_secs(config.ttl_secs)).filter(|d| !d.is_zero());
    if config.backend == CacheBackend::Redis {
        match RedisCache::new(&redis.url(), ttl) {
            Ok(cache) => {
                info!("Using Redis cache backend at {}:{}", redis.host, redis.port);
                return Arc::new(cache);
            }
            Err(e) => warn!("Failed to configure Redis cache, falling back to memory: {}", e),
        }
    }
    info!(
        "Using in-memory cache backend with capacity {} and ttl {}s",
        config.capacity, config.ttl_secs
    );
    Arc::new(MemoryCache::new(config.capacity, ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_backend_from_str() {
        assert_eq!("memory".parse::<CacheBackend>().unwrap(), CacheBackend::Memory);
        assert_eq!("LRU".parse::<CacheBackend>().unwrap(), CacheBackend::Memory);
        assert_eq!("redis".parse::<CacheBackend>().unwrap(), CacheBackend::Redis);
        assert!("memcached".parse::<CacheBackend>().is_err());
    }

    #[test]
    fn test_create_cache() {
        let memory = create_cache(&CacheConfig::default(), &RedisConfig::default());
        assert_eq!(memory.backend_name(), "memory");

        let config = CacheConfig {
            backend: CacheBackend::Redis,
            ..CacheConfig::default()
        };
        let redis = create_cache(&config, &RedisConfig::default());
        assert_eq!(redis.backend_name(), "redis");
    }
}
