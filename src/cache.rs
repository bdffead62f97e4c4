//! Redis connection used for the shared rate-limit store and session
//! lookups.
//!
//! SYSTEM CONTEXT
//! ==============
//! Startup connects once and hands the `Cache` to whatever needs it. The
//! underlying `ConnectionManager` reconnects on its own after the initial
//! connect, so a Redis blip after boot degrades lookups instead of killing
//! the process.

use std::time::Duration;

use redis::aio::ConnectionManager;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("redis connect timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Clone)]
pub struct Cache {
    manager: ConnectionManager,
}

impl Cache {
    /// A cheap clone of the shared multiplexed connection.
    #[must_use]
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

/// Connect to Redis and verify the connection with `PING`.
///
/// # Errors
///
/// Returns an error if the URL is invalid, the server is unreachable, or the
/// attempt takes longer than `timeout`.
pub async fn connect(url: &str, timeout: Duration) -> Result<Cache, CacheError> {
    let client = redis::Client::open(url)?;

    let connect = async {
        let mut manager = ConnectionManager::new(client).await?;
        let _pong: String = redis::cmd("PING").query_async(&mut manager).await?;
        Ok::<_, redis::RedisError>(manager)
    };

    let manager = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| CacheError::Timeout(timeout))??;

    Ok(Cache { manager })
}
