//! Redis-backed fixed-window counters, shared by every server instance.
//!
//! Each increment runs one Lua script, so the count and its expiry are set
//! atomically even when several instances hit the same key.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};

use mediator_types::{CounterStore, CounterStoreError, WindowCount};

const KEY_PREFIX: &str = "mediator:rate:";

// Returns {count, ttl_ms}. The first hit starts the window; a key that lost
// its TTL gets a fresh one instead of living forever.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

fn unavailable(e: impl Display) -> CounterStoreError {
    CounterStoreError::Unavailable(e.to_string())
}

/// Counter store over a Redis connection pool.
pub struct RedisCounterStore {
    pool: Pool,
    script: redis::Script,
    /// Upper bound for acquiring a connection plus running one command.
    timeout: Duration,
}

impl RedisCounterStore {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Builds the pool for `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// No connection is opened until the first command, so an unreachable
    /// server surfaces as [`CounterStoreError::Unavailable`] per call.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CounterStoreError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| unavailable(format!("Invalid Redis configuration: {}", e)))?;

        tracing::info!("Redis counter pool initialized");
        Ok(Self {
            pool,
            script: redis::Script::new(INCREMENT_SCRIPT),
            timeout,
        })
    }

    async fn connection(&self) -> Result<Connection, CounterStoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| unavailable(format!("Connection failed: {}", e)))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CounterStoreError>>,
    ) -> Result<T, CounterStoreError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                unavailable(format!(
                    "Redis did not answer within {} ms",
                    self.timeout.as_millis()
                ))
            })?
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, CounterStoreError> {
        let key = format!("{KEY_PREFIX}{key}");
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);

        let (count, ttl_ms): (i64, i64) = self
            .bounded(async {
                let mut conn = self.connection().await?;
                self.script
                    .key(&key)
                    .arg(window_ms)
                    .invoke_async(&mut *conn)
                    .await
                    .map_err(|e| unavailable(format!("Increment failed: {}", e)))
            })
            .await?;

        Ok(WindowCount {
            count: u64::try_from(count).unwrap_or(0),
            resets_in: Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0)),
        })
    }

    async fn ping(&self) -> Result<(), CounterStoreError> {
        let pong: String = self
            .bounded(async {
                let mut conn = self.connection().await?;
                redis::cmd("PING")
                    .query_async(&mut *conn)
                    .await
                    .map_err(|e| unavailable(format!("PING failed: {}", e)))
            })
            .await?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(unavailable(format!("Unexpected PING response: {}", pong)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on port 1, so every connection is refused.
    const UNREACHABLE: &str = "redis://127.0.0.1:1";

    #[test]
    fn test_invalid_url_rejected() {
        let result = RedisCounterStore::new("not a redis url", RedisCounterStore::DEFAULT_TIMEOUT);
        assert!(matches!(result, Err(CounterStoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let store = RedisCounterStore::new(UNREACHABLE, Duration::from_millis(500)).unwrap();

        let err = store
            .increment("ip:203.0.113.7", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, CounterStoreError::Unavailable(_)));
        assert!(store.ping().await.is_err());
    }
}
