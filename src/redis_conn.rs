//! Lazily established Redis connections shared by the lock and cache backends

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, RedisResult};
use std::time::Duration;
use tokio::sync::OnceCell;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_RETRIES: usize = 1;

/// A Redis client that connects on first use and reconnects transparently
pub struct LazyConnection {
    client: Client,
    manager: OnceCell<ConnectionManager>,
}

impl LazyConnection {
    /// Parse `url` without connecting.
    pub fn open(url: &str) -> RedisResult<Self> {
        Ok(Self {
            client: Client::open(url)?,
            manager: OnceCell::new(),
        })
    }

    /// Connection handle, establishing the connection on the first call.
    /// A failed attempt is retried on the next call.
    pub async fn get(&self) -> RedisResult<ConnectionManager> {
        self.manager
            .get_or_try_init(|| {
                let config = ConnectionManagerConfig::new()
                    .set_number_of_retries(CONNECT_RETRIES)
                    .set_connection_timeout(CONNECT_TIMEOUT)
                    .set_response_timeout(RESPONSE_TIMEOUT);
                ConnectionManager::new_with_config(self.client.clone(), config)
            })
            .await
            .cloned()
    }
}
