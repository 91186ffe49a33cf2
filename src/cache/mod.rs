//! Read-through cache abstraction
//!
//! Values are JSON documents so any backend can hold them. Callers use
//! [`get_json`] and [`set_json`] rather than serializing by hand.

pub mod config;
pub mod memory_cache;
pub mod redis_cache;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Cache errors. Never fatal to callers, which fall back to the source of truth.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait defining the cache interface
#[async_trait]
pub trait Cache: Send + Sync {
    /// Value stored under `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store `value` under `key`. `ttl` of `None` uses the backend default.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Short backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Read and deserialize a typed value.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Result<Option<T>, CacheError> {
    match cache.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and store a typed value.
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), CacheError> {
    let value = serde_json::to_value(value)?;
    cache.set(key, value, ttl).await
}

#[cfg(test)]
mod tests {
    use super::memory_cache::MemoryCache;
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        title: String,
        size: u64,
    }

    #[tokio::test]
    async fn test_typed_roundtrip() {
        let cache = MemoryCache::new(10, None);
        let sample = Sample { title: "notes".to_string(), size: 5 };
        set_json(&cache, "k", &sample, None).await.unwrap();

        let loaded: Option<Sample> = get_json(&cache, "k").await.unwrap();
        assert_eq!(loaded, Some(sample));
    }

    #[tokio::test]
    async fn test_raw_strings_are_json_strings() {
        let cache = MemoryCache::new(10, None);
        set_json(&cache, "raw", "plain text", None).await.unwrap();
        assert_eq!(cache.get("raw").await.unwrap(), Some(Value::String("plain text".to_string())));

        let loaded: Option<String> = get_json(&cache, "raw").await.unwrap();
        assert_eq!(loaded.as_deref(), Some("plain text"));
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_an_error() {
        let cache = MemoryCache::new(10, None);
        set_json(&cache, "k", "not a struct", None).await.unwrap();
        let loaded: Result<Option<Sample>, CacheError> = get_json(&cache, "k").await;
        assert!(matches!(loaded, Err(CacheError::Serialization(_))));
    }
}
