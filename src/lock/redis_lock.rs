//! Redis-based lock implementation
//!
//! `SET lock:<name> <owner> NX EX <timeout>` claims a lock atomically; Redis
//! expiry takes care of stale holders. Renewal and release are Lua scripts
//! that act only while the key still carries our owner token.

use crate::lock::{DistributedLock, DEFAULT_LOCK_TIMEOUT};
use crate::redis_conn::LazyConnection;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rand::RngCore;
use redis::RedisResult;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const KEY_PREFIX: &str = "lock:";

// Deletes the key only while it still carries our owner token
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

// Extends the expiry only while the key still carries our owner token
const TOUCH_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("EXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Lock backed by a Redis server
pub struct RedisLock {
    connection: LazyConnection,
    owner: String,
    // name -> timeout remembered for renewal
    held: Mutex<HashMap<String, Duration>>,
}

impl RedisLock {
    /// Create a lock client for `url`. No connection is made until first use.
    pub fn new(url: &str) -> RedisResult<Self> {
        let connection = LazyConnection::open(url)?;
        let mut owner = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut owner);
        Ok(Self {
            connection,
            owner: hex::encode(owner),
            held: Mutex::new(HashMap::new()),
        })
    }

    /// Token identifying this instance as a lock holder
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn key(name: &str) -> String {
        format!("{}{}", KEY_PREFIX, name)
    }

    async fn try_acquire(&self, name: &str, timeout: Duration) -> RedisResult<bool> {
        let mut conn = self.connection.get().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::key(name))
            .arg(&self.owner)
            .arg("NX")
            .arg("EX")
            .arg(expiry_secs(timeout))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn try_release(&self, name: &str) -> RedisResult<bool> {
        let mut conn = self.connection.get().await?;
        let removed: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(Self::key(name))
            .arg(&self.owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn try_touch(&self, name: &str, timeout: Duration) -> RedisResult<bool> {
        let mut conn = self.connection.get().await?;
        let renewed: i64 = redis::Script::new(TOUCH_SCRIPT)
            .key(Self::key(name))
            .arg(&self.owner)
            .arg(expiry_secs(timeout))
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    fn forget(&self, name: &str) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    fn renewal_timeout(&self, name: &str) -> Duration {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(DEFAULT_LOCK_TIMEOUT)
    }
}

/// Whole seconds for `EX`/`EXPIRE`; Redis rejects zero.
fn expiry_secs(timeout: Duration) -> u64 {
    timeout.as_secs().max(1)
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn acquire(&self, name: &str, timeout: Duration) -> bool {
        match self.try_acquire(name, timeout).await {
            Ok(true) => {
                self.held
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.to_string(), timeout);
                info!("Acquired Redis lock {}", name);
                true
            }
            Ok(false) => {
                debug!("Redis lock {} held elsewhere", name);
                false
            }
            Err(e) => {
                error!("Failed to acquire Redis lock {}: {}", name, e);
                false
            }
        }
    }

    async fn release(&self, name: &str) {
        self.forget(name);
        match self.try_release(name).await {
            Ok(true) => info!("Released Redis lock {}", name),
            Ok(false) => debug!("Redis lock {} was not held by this instance", name),
            Err(e) => warn!("Failed to release Redis lock {}: {}", name, e),
        }
    }

    async fn touch(&self, name: &str) -> bool {
        let timeout = self.renewal_timeout(name);
        match self.try_touch(name, timeout).await {
            Ok(true) => {
                debug!("Renewed Redis lock {} for {:?}", name, timeout);
                return true;
            }
            Ok(false) => warn!("Redis lock {} expired or taken over before renewal", name),
            Err(e) => warn!("Failed to renew Redis lock {}: {}", name, e),
        }
        self.forget(name);
        false
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
