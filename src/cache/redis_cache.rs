//! Redis cache implementation
//!
//! Values are stored as JSON strings under a namespace prefix. Capacity and
//! expiry are left to the server.

use crate::cache::{Cache, CacheError};
use crate::redis_conn::LazyConnection;
use async_trait::async_trait;
use redis::RedisResult;
use serde_json::Value;
use std::time::Duration;

/// Namespace for paste cache keys
pub const KEY_PREFIX: &str = "paste:";

/// Cache backed by a Redis server
pub struct RedisCache {
    connection: LazyConnection,
    default_ttl: Option<Duration>,
}

impl RedisCache {
    /// Create a cache client for `url`. No connection is made until first use.
    pub fn new(url: &str, default_ttl: Option<Duration>) -> RedisResult<Self> {
        Ok(Self {
            connection: LazyConnection::open(url)?,
            default_ttl,
        })
    }

    fn key(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection.get().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::key(key))
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let payload = serde_json::to_string(&value)?;
        let mut conn = self.connection.get().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(Self::key(key)).arg(payload);
        if let Some(ttl) = ttl.or(self.default_ttl) {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.get().await?;
        let _: i64 = redis::cmd("DEL")
            .arg(Self::key(key))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
